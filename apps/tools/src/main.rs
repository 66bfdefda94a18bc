use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use shared::{
    domain::{Election, ElectionId},
    protocol::ELECTIONS_KEY,
};
use storage::Storage;

/// Writes the cached election list the screen reads from.
#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/elections.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace the list with a few elections around the current time.
    Seed,
    Add {
        id: i64,
        title: String,
        /// RFC 3339 timestamp or milliseconds since epoch.
        start: String,
        /// RFC 3339 timestamp or milliseconds since epoch.
        end: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    Remove {
        id: i64,
    },
    List,
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::Seed => {
            let elections = demo_elections(Utc::now());
            storage.save_elections(&elections).await?;
            println!("seeded {} elections", elections.len());
        }
        Command::Add {
            id,
            title,
            start,
            end,
            description,
        } => {
            let election = Election {
                id: ElectionId(id),
                title,
                description,
                start_date: parse_timestamp(&start)?,
                end_date: parse_timestamp(&end)?,
            };
            if election.is_malformed() {
                bail!("end must not be before start");
            }
            let mut elections = storage.load_elections().await?;
            elections.retain(|existing| existing.id != election.id);
            elections.push(election);
            storage.save_elections(&elections).await?;
            println!("stored election id={id}");
        }
        Command::Remove { id } => {
            let mut elections = storage.load_elections().await?;
            let before = elections.len();
            elections.retain(|existing| existing.id != ElectionId(id));
            storage.save_elections(&elections).await?;
            println!("removed {} election(s)", before - elections.len());
        }
        Command::List => {
            let raw = storage.get_item(ELECTIONS_KEY).await?;
            match raw {
                Some(raw) => {
                    let value: serde_json::Value = serde_json::from_str(&raw)
                        .with_context(|| format!("'{ELECTIONS_KEY}' does not hold JSON"))?;
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                None => println!("'{ELECTIONS_KEY}' is not set"),
            }
        }
        Command::Clear => {
            let removed = storage.remove_item(ELECTIONS_KEY).await?;
            println!("cleared={removed}");
        }
    }

    Ok(())
}

fn parse_timestamp(raw: &str) -> Result<i64> {
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(ms);
    }
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("'{raw}' is neither epoch millis nor RFC 3339"))?;
    Ok(parsed.timestamp_millis())
}

fn demo_elections(now: DateTime<Utc>) -> Vec<Election> {
    let at = |offset: Duration| (now + offset).timestamp_millis();
    vec![
        Election {
            id: ElectionId(1),
            title: "Board chair".into(),
            description: "Halfway through".into(),
            start_date: at(Duration::minutes(-30)),
            end_date: at(Duration::minutes(30)),
        },
        Election {
            id: ElectionId(2),
            title: "Treasurer".into(),
            description: "Closing soon".into(),
            start_date: at(Duration::minutes(-57)),
            end_date: at(Duration::minutes(3)),
        },
        Election {
            id: ElectionId(3),
            title: "Budget".into(),
            description: "Already closed".into(),
            start_date: at(Duration::days(-2)),
            end_date: at(Duration::days(-1)),
        },
        Election {
            id: ElectionId(4),
            title: "Bylaws".into(),
            description: "Opens tomorrow".into(),
            start_date: at(Duration::days(1)),
            end_date: at(Duration::days(2)),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_millis_and_rfc3339() {
        assert_eq!(parse_timestamp("1700000000000").expect("millis"), 1_700_000_000_000);
        assert_eq!(
            parse_timestamp("2023-11-14T22:13:20Z").expect("rfc3339"),
            1_700_000_000_000
        );
        assert!(parse_timestamp("next tuesday").is_err());
    }

    #[test]
    fn demo_set_covers_every_phase() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_000).expect("timestamp");
        let elections = demo_elections(now);
        let now_ms = now.timestamp_millis();
        assert!(elections.iter().all(|e| !e.is_malformed()));
        assert!(elections.iter().any(|e| e.start_date < now_ms && e.end_date > now_ms));
        assert!(elections.iter().any(|e| e.end_date < now_ms));
        assert!(elections.iter().any(|e| e.start_date > now_ms));
    }
}

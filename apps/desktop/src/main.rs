use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    ElectionListController, LocalPinSession, ReadOutcome, ScreenEvent, SystemClock,
    UnlockOutcome,
};
use shared::{domain::User, protocol::ScreenView};
use storage::Storage;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, normalize_database_url};

/// Headless driver for the election list screen.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    database_url: Option<String>,
    /// Signed-in user; omit for an anonymous session.
    #[arg(long)]
    username: Option<String>,
    /// PIN held by the session.
    #[arg(long, default_value = "")]
    pin: String,
    /// Secret to unlock with; read from stdin when omitted.
    #[arg(long)]
    enter: Option<String>,
    /// Treat the session as unlocked by an earlier visit.
    #[arg(long)]
    already_unlocked: bool,
    /// How long to keep the screen mounted and print progress ticks.
    #[arg(long, default_value_t = 5)]
    watch_seconds: u64,
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings();
    if let Some(url) = &args.database_url {
        settings.database_url = normalize_database_url(url);
    }
    if args.username.is_some() {
        settings.username = args.username.clone();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log_filter))
        .init();

    let storage = Storage::new(&settings.database_url)
        .await
        .with_context(|| format!("failed to open store at '{}'", settings.database_url))?;

    let session = match settings.username.as_deref() {
        Some(username) => {
            let session = LocalPinSession::new(User::new(username), &args.pin);
            if args.already_unlocked {
                session.already_unlocked()
            } else {
                session
            }
        }
        None => LocalPinSession::anonymous(),
    };

    let controller = Arc::new(ElectionListController::new(
        Arc::new(storage),
        Arc::new(session),
        Arc::new(SystemClock),
        settings.progress_config(),
    ));
    let mut events = controller.subscribe_events();

    if controller.load_initial().await? == ReadOutcome::Deferred {
        let secret = match &args.enter {
            Some(secret) => secret.clone(),
            None => prompt_pin().await?,
        };
        match controller.unlock(&secret).await? {
            UnlockOutcome::Unlocked | UnlockOutcome::AlreadyUnlocked => {}
            outcome => {
                println!("Screen stays locked ({outcome:?}).");
                controller.deactivate().await;
                return Ok(());
            }
        }
    }

    print_view(&controller.view().await, args.json)?;
    watch(&controller, &mut events, Duration::from_secs(args.watch_seconds)).await;

    controller.deactivate().await;
    Ok(())
}

async fn prompt_pin() -> Result<String> {
    println!("Enter PIN:");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("failed to read PIN from stdin")?;
    Ok(line.trim().to_string())
}

async fn watch(
    controller: &ElectionListController,
    events: &mut tokio::sync::broadcast::Receiver<ScreenEvent>,
    duration: Duration,
) {
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("desktop: interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(ScreenEvent::Progress { election_id, progress, near_end, .. }) => {
                    println!(
                        "election {} progress={:.3} phase={:?}{}",
                        election_id.0,
                        progress.ratio,
                        progress.phase(),
                        if near_end { " (ending soon)" } else { "" }
                    );
                }
                Ok(ScreenEvent::Notice(notice)) => warn!("desktop: {notice}"),
                Ok(ScreenEvent::StateChanged(state)) => {
                    info!(
                        "desktop: state phase={:?} count={} refreshing={}",
                        state.phase,
                        state.count(),
                        state.refreshing
                    );
                }
                Err(RecvError::Lagged(skipped)) => warn!("desktop: skipped {skipped} events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    if let Some(intent) = controller.create().await {
        info!("desktop: create control available intent={intent:?}");
    }
}

fn print_view(view: &ScreenView, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(view)?);
        return Ok(());
    }

    if !view.loaded {
        println!("Loading...");
        return Ok(());
    }
    if view.is_empty_state() {
        println!("No elections");
        return Ok(());
    }

    for row in &view.rows {
        let progress = match (row.show_progress, row.progress_ratio) {
            (true, Some(ratio)) if row.near_end => format!("{:>5.1}% (ending soon)", ratio * 100.0),
            (true, Some(ratio)) => format!("{:>5.1}%", ratio * 100.0),
            _ => String::new(),
        };
        println!(
            "{:>4}  {:<24} {} {}  {}",
            row.id.0,
            row.title,
            row.start_date_label.as_deref().unwrap_or("--/--/----"),
            row.start_time_label.as_deref().unwrap_or("--:-- --"),
            progress
        );
    }
    Ok(())
}

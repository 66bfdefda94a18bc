use std::{fs, path::Path, time::Duration};

use client_core::ProgressConfig;
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "elections.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub username: Option<String>,
    pub tick_interval_ms: u64,
    pub near_end_threshold: f64,
    pub stop_ticking_when_ended: bool,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/elections.db".into(),
            username: None,
            tick_interval_ms: 1000,
            near_end_threshold: 0.8,
            stop_ticking_when_ended: true,
            log_filter: "info".into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    database_url: Option<String>,
    username: Option<String>,
    tick_interval_ms: Option<u64>,
    near_end_threshold: Option<f64>,
    stop_ticking_when_ended: Option<bool>,
    log_filter: Option<String>,
}

impl Settings {
    pub fn progress_config(&self) -> ProgressConfig {
        let defaults = ProgressConfig::default();
        let near_end_threshold =
            if self.near_end_threshold > 0.0 && self.near_end_threshold <= 1.0 {
                self.near_end_threshold
            } else {
                warn!(
                    "config: near_end_threshold={} outside (0, 1], using {}",
                    self.near_end_threshold, defaults.near_end_threshold
                );
                defaults.near_end_threshold
            };

        ProgressConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            near_end_threshold,
            stop_when_ended: self.stop_ticking_when_ended,
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |key| {
        std::env::var(key).ok()
    })
}

/// File values override defaults; environment values override the file.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file(&mut settings, file_cfg),
            Err(err) => warn!("config: ignoring malformed '{}': {err}", path.display()),
        }
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__USERNAME") {
        settings.username = Some(v);
    }
    if let Some(v) = env("APP__TICK_INTERVAL_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.tick_interval_ms = parsed;
        }
    }
    if let Some(v) = env("APP__NEAR_END_THRESHOLD") {
        if let Ok(parsed) = v.parse::<f64>() {
            settings.near_end_threshold = parsed;
        }
    }
    if let Some(v) = env("APP__STOP_TICKING_WHEN_ENDED") {
        if let Ok(parsed) = v.parse::<bool>() {
            settings.stop_ticking_when_ended = parsed;
        }
    }
    if let Some(v) = env("RUST_LOG") {
        settings.log_filter = v;
    }

    settings.database_url = normalize_database_url(&settings.database_url);
    settings
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.username {
        settings.username = Some(v);
    }
    if let Some(v) = file_cfg.tick_interval_ms {
        settings.tick_interval_ms = v;
    }
    if let Some(v) = file_cfg.near_end_threshold {
        settings.near_end_threshold = v;
    }
    if let Some(v) = file_cfg.stop_ticking_when_ended {
        settings.stop_ticking_when_ended = v;
    }
    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite:") {
        return raw_database_url.to_string();
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;

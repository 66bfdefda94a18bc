use serde::{Deserialize, Serialize};

use crate::domain::{Election, ElectionId};

/// Store key holding the cached election list. Readers and the
/// creation flow must agree on it; nothing else about the stored value is
/// owned here.
pub const ELECTIONS_KEY: &str = "@elections";

/// Decodes the value stored under [`ELECTIONS_KEY`]. A missing key and a
/// stored `null` both mean "no elections yet".
pub fn decode_elections(raw: Option<&str>) -> serde_json::Result<Vec<Election>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    let elections: Option<Vec<Election>> = serde_json::from_str(raw)?;
    Ok(elections.unwrap_or_default())
}

pub const START_DATE_FORMAT: &str = "%m/%d/%Y";
pub const START_TIME_FORMAT: &str = "%I:%M %p";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum NavigationIntent {
    ElectionDetails { election: Election },
    CreateElection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListPhase {
    Unloaded,
    Loading,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElectionRow {
    pub id: ElectionId,
    pub title: String,
    pub description: String,
    pub start_date: i64,
    pub end_date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time_label: Option<String>,
    /// `None` when the election window is malformed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_ratio: Option<f64>,
    pub show_progress: bool,
    pub near_end: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenView {
    pub phase: ListPhase,
    pub rows: Vec<ElectionRow>,
    pub count: usize,
    pub loaded: bool,
    pub refreshing: bool,
    pub gate_open: bool,
    pub can_create: bool,
}

impl ScreenView {
    pub fn is_empty_state(&self) -> bool {
        self.loaded && self.count == 0
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);
    };
}

id_newtype!(ElectionId);

/// A titled item tracked through its `[start_date, end_date]` window.
///
/// Dates are milliseconds since the Unix epoch. Field names follow the
/// camelCase layout the `"@elections"` store key is written with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Election {
    pub id: ElectionId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_date: i64,
    pub end_date: i64,
}

impl Election {
    /// An election whose window runs backwards cannot carry a progress value.
    /// A zero-length window is not malformed: it is simply already over.
    pub fn is_malformed(&self) -> bool {
        self.end_date < self.start_date
    }

    pub fn starts_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.start_date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::errors::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    Pending,
    Ready,
    Failed,
}

/// Current fetch state of one request key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub key: String,
    pub status: CacheStatus,
    pub value: Option<Value>,
    pub error: Option<ErrorKind>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub subscriber_count: usize,
}

impl CacheEntry {
    pub fn pending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: CacheStatus::Pending,
            value: None,
            error: None,
            last_fetched_at: None,
            subscriber_count: 0,
        }
    }

    /// Record the result of a fetch.
    ///
    /// A failure clears the previous value: the widget shows an error rather
    /// than stale data.
    pub fn apply(&mut self, outcome: Result<Value, ErrorKind>) {
        match outcome {
            Ok(value) => {
                self.status = CacheStatus::Ready;
                self.value = Some(value);
                self.error = None;
            }
            Err(error) => {
                self.status = CacheStatus::Failed;
                self.value = None;
                self.error = Some(error);
            }
        }
        self.last_fetched_at = Some(Utc::now());
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Results container: task name to the latest result stored for it.
pub type ResultsContainer = BTreeMap<String, TaskResult>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub data: Value,
    pub timestamp: String,
}

impl TaskResult {
    pub fn new(data: Value, timestamp: impl Into<String>) -> Self {
        Self {
            data,
            timestamp: timestamp.into(),
        }
    }

    /// Parses `timestamp`; `None` when it was written by something that did
    /// not use RFC 3339.
    pub fn written_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(&self.timestamp, &Rfc3339).ok()
    }
}

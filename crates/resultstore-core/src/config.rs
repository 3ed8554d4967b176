use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::CoreResult;
use crate::models::error::invalid_input;

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 3;
const DEFAULT_SEARCH_PAGE_SIZE: usize = 10_000;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Conditional writes keyed on the document version token, retried on
    /// conflict.
    #[default]
    Optimistic,
    /// Unconditional full-document overwrite.
    ///
    /// Concurrent writers to one document can lose each other's slots, and a
    /// document deleted between the read and the write is recreated with the
    /// body that was read.
    LastWriterWins,
}

/// Settings for a [`ResultStore`](crate::store::ResultStore).
///
/// Deserializes with defaults for every missing key, so a job runner can embed
/// it as an optional section of its own configuration.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub request_timeout_ms: u64,
    pub write_mode: WriteMode,
    pub max_write_attempts: u32,
    pub search_page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            write_mode: WriteMode::default(),
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
            search_page_size: DEFAULT_SEARCH_PAGE_SIZE,
        }
    }
}

impl StoreConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    pub fn with_max_write_attempts(mut self, attempts: u32) -> Self {
        self.max_write_attempts = attempts;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_search_page_size(mut self, page_size: usize) -> Self {
        self.search_page_size = page_size;
        self
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.request_timeout_ms == 0 {
            return Err(invalid_input("request_timeout_ms must be greater than zero"));
        }
        if self.max_write_attempts == 0 {
            return Err(invalid_input("max_write_attempts must be at least 1"));
        }
        if self.search_page_size == 0 {
            return Err(invalid_input("search_page_size must be greater than zero"));
        }
        Ok(())
    }
}

pub mod batch;
pub mod selection;

pub use selection::TaskSelection;

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::codec;
use crate::config::{StoreConfig, WriteMode};
use crate::models::error::{internal, invalid_input, parse_failure};
use crate::models::{
    CoreError, CoreErrorKind, CoreResult, DocumentAddress, PutOutcome, ResultsContainer,
    TaskResult,
};
use crate::persistence::DocumentStore;

/// Reads and writes per-task result slots on documents held by a
/// [`DocumentStore`].
///
/// Every write goes through one get, decode, mutate, encode, put cycle on the
/// full document body. In [`WriteMode::Optimistic`] the put is conditional on
/// the version token read by the get, and the cycle is repeated on conflict.
pub struct ResultStore {
    client: Arc<dyn DocumentStore>,
    config: StoreConfig,
}

impl ResultStore {
    pub fn new(client: Arc<dyn DocumentStore>) -> Self {
        Self {
            client,
            config: StoreConfig::default(),
        }
    }

    pub fn with_config(client: Arc<dyn DocumentStore>, config: StoreConfig) -> CoreResult<Self> {
        config.validate()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<dyn DocumentStore> {
        &self.client
    }

    /// Stores `data` as the result of `task_name` on the addressed document and
    /// hands `data` back so task chains can pass it along.
    pub fn store_single<T: Serialize>(
        &self,
        data: T,
        task_name: &str,
        address: &DocumentAddress,
    ) -> CoreResult<T> {
        validate_task_name(task_name)?;
        let value = serde_json::to_value(&data).map_err(|error| {
            invalid_input(format!("task result is not JSON-serializable: {error}"))
                .at(address)
                .for_task(task_name)
        })?;

        self.update_results(address, task_name, |results| {
            let timestamp = next_timestamp(results.get(task_name), OffsetDateTime::now_utc())?;
            results.insert(
                task_name.to_string(),
                TaskResult::new(value.clone(), timestamp),
            );
            Ok(())
        })?;

        tracing::debug!(
            index = %address.index,
            doc_type = %address.doc_type,
            id = %address.id,
            task = task_name,
            "stored task result"
        );
        Ok(data)
    }

    /// Drops the result slot for `task_name`, returning what was stored there.
    pub fn remove_result(
        &self,
        task_name: &str,
        address: &DocumentAddress,
    ) -> CoreResult<Option<TaskResult>> {
        validate_task_name(task_name)?;
        self.update_results(address, task_name, |results| Ok(results.remove(task_name)))
    }

    /// Returns the stored data for `task_name`, or `None` if the task has not
    /// run on this document.
    pub fn get_single_result(
        &self,
        task_name: &str,
        address: &DocumentAddress,
    ) -> CoreResult<Option<Value>> {
        Ok(self
            .get_task_result(task_name, address)?
            .map(|result| result.data))
    }

    pub fn get_single_result_as<T: DeserializeOwned>(
        &self,
        task_name: &str,
        address: &DocumentAddress,
    ) -> CoreResult<Option<T>> {
        self.get_single_result(task_name, address)?
            .map(|data| {
                serde_json::from_value(data).map_err(|error| {
                    parse_failure(format!("stored result has an unexpected shape: {error}"))
                        .at(address)
                        .for_task(task_name)
                })
            })
            .transpose()
    }

    /// Like [`get_single_result`](Self::get_single_result) but keeps the write
    /// timestamp.
    pub fn get_task_result(
        &self,
        task_name: &str,
        address: &DocumentAddress,
    ) -> CoreResult<Option<TaskResult>> {
        let stored = self
            .client
            .get(address)
            .map_err(|error| error.at(address).for_task(task_name))?;
        let mut results =
            codec::decode_results(&stored.body).map_err(|error| error.at(address))?;
        Ok(results.remove(task_name))
    }

    fn update_results<R>(
        &self,
        address: &DocumentAddress,
        task_name: &str,
        mut mutate: impl FnMut(&mut ResultsContainer) -> CoreResult<R>,
    ) -> CoreResult<R> {
        let attempts = match self.config.write_mode {
            WriteMode::LastWriterWins => 1,
            WriteMode::Optimistic => self.config.max_write_attempts.max(1),
        };
        let attribute = |error: CoreError| error.at(address).for_task(task_name);

        for attempt in 1..=attempts {
            let stored = self.client.get(address).map_err(attribute)?;
            let mut document = codec::decode(stored.body).map_err(attribute)?;

            let outcome = mutate(&mut document.results).map_err(attribute)?;
            // Writing or removing a slot replaces whatever unreadable entry
            // sat under the same name.
            document.unreadable.remove(task_name);
            let body = codec::encode(document).map_err(attribute)?;

            match self.config.write_mode {
                WriteMode::LastWriterWins => {
                    self.client.put(address, &body).map_err(attribute)?;
                    return Ok(outcome);
                }
                WriteMode::Optimistic => {
                    match self
                        .client
                        .put_if_version(address, &body, stored.version)
                        .map_err(attribute)?
                    {
                        PutOutcome::Written { .. } => return Ok(outcome),
                        PutOutcome::VersionConflict { current } => {
                            tracing::debug!(
                                index = %address.index,
                                doc_type = %address.doc_type,
                                id = %address.id,
                                task = task_name,
                                attempt,
                                expected = stored.version,
                                current,
                                "document changed between read and write; retrying"
                            );
                        }
                    }
                }
            }
        }

        tracing::warn!(
            index = %address.index,
            doc_type = %address.doc_type,
            id = %address.id,
            task = task_name,
            attempts,
            "giving up on conflicting document writes"
        );
        Err(CoreError::new(
            CoreErrorKind::ConcurrentModification,
            format!("document '{address}' kept changing during {attempts} write attempts"),
        )
        .at(address)
        .for_task(task_name))
    }
}

fn validate_task_name(task_name: &str) -> CoreResult<()> {
    if task_name.trim().is_empty() {
        return Err(invalid_input("task name must not be empty").for_task(task_name));
    }
    Ok(())
}

/// Picks the timestamp for a new write. Reuses the previous timestamp when the
/// wall clock reads earlier, so timestamps of one slot never go backwards.
fn next_timestamp(previous: Option<&TaskResult>, now: OffsetDateTime) -> CoreResult<String> {
    if let Some(previous) = previous
        && let Some(written_at) = previous.written_at()
        && written_at > now
    {
        return Ok(previous.timestamp.clone());
    }

    now.format(&Rfc3339)
        .map_err(|error| internal(format!("failed to format result timestamp: {error}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::{Duration, OffsetDateTime};

    use super::next_timestamp;
    use crate::models::TaskResult;

    #[test]
    fn timestamp_uses_wall_clock_when_ahead() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let previous = TaskResult::new(json!(1), "2000-01-01T00:00:00Z");

        assert_eq!(
            next_timestamp(Some(&previous), now).unwrap(),
            "2023-11-14T22:13:20Z"
        );
    }

    #[test]
    fn timestamp_never_moves_backwards() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let ahead = (now + Duration::hours(1))
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap();
        let previous = TaskResult::new(json!(1), ahead.clone());

        assert_eq!(next_timestamp(Some(&previous), now).unwrap(), ahead);
    }

    #[test]
    fn unparseable_previous_timestamp_is_replaced() {
        let now = OffsetDateTime::from_unix_timestamp(0).unwrap();
        let previous = TaskResult::new(json!(1), "yesterday");

        assert_eq!(
            next_timestamp(Some(&previous), now).unwrap(),
            "1970-01-01T00:00:00Z"
        );
    }
}

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::models::error::internal;
use crate::models::{
    CoreError, CoreErrorKind, CoreResult, DocumentAddress, ResultsContainer, TaskResult,
};
use crate::query::Query;
use crate::store::{ResultStore, TaskSelection};

/// Async front for [`ResultStore`] for use inside tokio job workers.
///
/// Each call runs on the blocking pool and is bounded by the store's
/// configured request timeout. A timed-out call fails with
/// `StoreUnavailable`; the blocking call it started is detached, not retried.
#[derive(Clone)]
pub struct AsyncResultStore {
    inner: Arc<ResultStore>,
    timeout: Duration,
}

impl AsyncResultStore {
    pub fn new(inner: Arc<ResultStore>) -> Self {
        let timeout = inner.config().request_timeout();
        Self { inner, timeout }
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.inner
    }

    pub async fn store_single(
        &self,
        data: Value,
        task_name: &str,
        address: &DocumentAddress,
    ) -> CoreResult<Value> {
        let task_name = task_name.to_string();
        let address = address.clone();
        self.run("store_single", move |store| {
            store.store_single(data, &task_name, &address)
        })
        .await
    }

    pub async fn get_single_result(
        &self,
        task_name: &str,
        address: &DocumentAddress,
    ) -> CoreResult<Option<Value>> {
        let task_name = task_name.to_string();
        let address = address.clone();
        self.run("get_single_result", move |store| {
            store.get_single_result(&task_name, &address)
        })
        .await
    }

    pub async fn get_tasks_per_index(
        &self,
        index: &str,
        doc_type: &str,
    ) -> CoreResult<BTreeSet<String>> {
        let (index, doc_type) = (index.to_string(), doc_type.to_string());
        self.run("get_tasks_per_index", move |store| {
            store.get_tasks_per_index(&index, &doc_type)
        })
        .await
    }

    pub async fn fetch_documents_by_task(
        &self,
        index: &str,
        doc_type: &str,
        query: Query,
        task_name: &str,
    ) -> CoreResult<Vec<String>> {
        let (index, doc_type, task_name) =
            (index.to_string(), doc_type.to_string(), task_name.to_string());
        self.run("fetch_documents_by_task", move |store| {
            store.fetch_documents_by_task(&index, &doc_type, &query, &task_name)
        })
        .await
    }

    pub async fn fetch_results_by_document(
        &self,
        index: &str,
        doc_type: &str,
        query: Query,
        task_name: &str,
    ) -> CoreResult<Vec<Value>> {
        let (index, doc_type, task_name) =
            (index.to_string(), doc_type.to_string(), task_name.to_string());
        self.run("fetch_results_by_document", move |store| {
            store.fetch_results_by_document(&index, &doc_type, &query, &task_name)
        })
        .await
    }

    pub async fn fetch_query_details_batch(
        &self,
        index: &str,
        doc_type: &str,
        query: Query,
        selection: TaskSelection,
    ) -> CoreResult<Vec<(String, ResultsContainer)>> {
        let (index, doc_type) = (index.to_string(), doc_type.to_string());
        self.run("fetch_query_details_batch", move |store| {
            store.fetch_query_details_batch(&index, &doc_type, &query, &selection)
        })
        .await
    }

    pub async fn remove_result(
        &self,
        task_name: &str,
        address: &DocumentAddress,
    ) -> CoreResult<Option<TaskResult>> {
        let task_name = task_name.to_string();
        let address = address.clone();
        self.run("remove_result", move |store| {
            store.remove_result(&task_name, &address)
        })
        .await
    }

    pub async fn get_task_result(
        &self,
        task_name: &str,
        address: &DocumentAddress,
    ) -> CoreResult<Option<TaskResult>> {
        let task_name = task_name.to_string();
        let address = address.clone();
        self.run("get_task_result", move |store| {
            store.get_task_result(&task_name, &address)
        })
        .await
    }

    pub async fn fetch_query_batch(
        &self,
        index: &str,
        doc_type: &str,
        query: Query,
        field: &str,
    ) -> CoreResult<Vec<Value>> {
        let (index, doc_type, field) = (index.to_string(), doc_type.to_string(), field.to_string());
        self.run("fetch_query_batch", move |store| {
            store.fetch_query_batch(&index, &doc_type, &query, &field)
        })
        .await
    }

    async fn run<T, F>(&self, operation: &'static str, call: F) -> CoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ResultStore) -> CoreResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.inner);
        let handle = tokio::task::spawn_blocking(move || call(&store));

        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(internal(format!(
                "result store '{operation}' join failure: {join_error}"
            ))),
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_ms = timeout_millis(self.timeout),
                    "result store call timed out"
                );
                Err(CoreError::new(
                    CoreErrorKind::StoreUnavailable,
                    format!(
                        "result store '{operation}' timed out after {} ms",
                        timeout_millis(self.timeout)
                    ),
                ))
            }
        }
    }
}

fn timeout_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

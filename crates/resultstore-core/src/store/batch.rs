use std::collections::BTreeSet;

use serde_json::Value;

use crate::codec;
use crate::models::{CoreResult, ResultsContainer, StoredDocument};
use crate::query::Query;
use crate::store::{ResultStore, TaskSelection};

impl ResultStore {
    /// Union of task names stored on any document under `(index, doc_type)`.
    pub fn get_tasks_per_index(&self, index: &str, doc_type: &str) -> CoreResult<BTreeSet<String>> {
        Ok(self
            .search_results(index, doc_type, &Query::MatchAll)?
            .into_iter()
            .flat_map(|(_, results)| results.into_keys())
            .collect())
    }

    /// Ids of documents matching `query` that carry a result for `task_name`.
    pub fn fetch_documents_by_task(
        &self,
        index: &str,
        doc_type: &str,
        query: &Query,
        task_name: &str,
    ) -> CoreResult<Vec<String>> {
        Ok(self
            .search_results(index, doc_type, query)?
            .into_iter()
            .filter(|(_, results)| results.contains_key(task_name))
            .map(|(id, _)| id)
            .collect())
    }

    /// Stored data of `task_name` for each matching document that has it.
    pub fn fetch_results_by_document(
        &self,
        index: &str,
        doc_type: &str,
        query: &Query,
        task_name: &str,
    ) -> CoreResult<Vec<Value>> {
        Ok(self
            .search_results(index, doc_type, query)?
            .into_iter()
            .filter_map(|(_, mut results)| results.remove(task_name))
            .map(|result| result.data)
            .collect())
    }

    /// Every matching document id paired with the task entries picked by
    /// `selection`. Documents without results are reported with an empty map.
    pub fn fetch_query_details_batch(
        &self,
        index: &str,
        doc_type: &str,
        query: &Query,
        selection: &TaskSelection,
    ) -> CoreResult<Vec<(String, ResultsContainer)>> {
        Ok(self
            .search_results(index, doc_type, query)?
            .into_iter()
            .map(|(id, results)| (id, selection.project(results)))
            .collect())
    }

    /// Contents of `field` for every matching document; documents without the
    /// field are left out.
    pub fn fetch_query_batch(
        &self,
        index: &str,
        doc_type: &str,
        query: &Query,
        field: &str,
    ) -> CoreResult<Vec<Value>> {
        Ok(self
            .search(index, doc_type, query)?
            .into_iter()
            .filter_map(|mut document| document.body.remove(field))
            .filter(|value| !value.is_null())
            .collect())
    }

    fn search(&self, index: &str, doc_type: &str, query: &Query) -> CoreResult<Vec<StoredDocument>> {
        let page_size = self.config.search_page_size;
        let hits = self.client.search(index, doc_type, query, page_size)?;
        if hits.len() >= page_size {
            tracing::warn!(
                index,
                doc_type,
                page_size,
                "search filled the whole page; results may be truncated"
            );
        }
        Ok(hits)
    }

    /// Searches and decodes each hit's results container. Hits whose
    /// container cannot be decoded are skipped.
    fn search_results(
        &self,
        index: &str,
        doc_type: &str,
        query: &Query,
    ) -> CoreResult<Vec<(String, ResultsContainer)>> {
        let hits = self.search(index, doc_type, query)?;
        let mut decoded = Vec::with_capacity(hits.len());

        for document in hits {
            match codec::decode_results(&document.body) {
                Ok(results) => decoded.push((document.id, results)),
                Err(error) => tracing::warn!(
                    index,
                    doc_type,
                    id = %document.id,
                    kind = ?error.kind,
                    message = %error.message,
                    "skipping document with undecodable results"
                ),
            }
        }

        Ok(decoded)
    }
}

pub mod in_memory;

pub use in_memory::InMemoryDocumentStore;

use crate::models::{CoreError, DocumentAddress, DocumentBody, PutOutcome, StoredDocument};
use crate::query::Query;

pub type PersistenceResult<T> = Result<T, CoreError>;

pub trait MigrationStore: Send + Sync {
    fn current_version(&self) -> PersistenceResult<i64>;

    fn apply_migration(&self, target_version: i64) -> PersistenceResult<()>;
}

/// Document CRUD and query capabilities the result store relies on.
///
/// Implementations report a missing document as `CoreErrorKind::NotFound` and
/// any failure to reach or use the backing database as
/// `CoreErrorKind::StoreUnavailable`.
pub trait DocumentStore: Send + Sync {
    fn get(&self, address: &DocumentAddress) -> PersistenceResult<StoredDocument>;

    /// Overwrites the whole body, creating the document if needed. Returns the
    /// new version token.
    fn put(&self, address: &DocumentAddress, body: &DocumentBody) -> PersistenceResult<u64>;

    /// Overwrites the body only if the stored version still equals
    /// `expected_version`.
    fn put_if_version(
        &self,
        address: &DocumentAddress,
        body: &DocumentBody,
        expected_version: u64,
    ) -> PersistenceResult<PutOutcome>;

    /// Returns at most `limit` documents under `(index, doc_type)` whose body
    /// matches `query`, ordered by id.
    fn search(
        &self,
        index: &str,
        doc_type: &str,
        query: &Query,
        limit: usize,
    ) -> PersistenceResult<Vec<StoredDocument>>;

    /// Stores a new document under a generated id and returns that id.
    fn create(&self, index: &str, doc_type: &str, body: &DocumentBody)
    -> PersistenceResult<String>;

    fn delete(&self, address: &DocumentAddress) -> PersistenceResult<bool>;

    /// Makes preceding writes visible to subsequent searches.
    fn flush(&self) -> PersistenceResult<()> {
        Ok(())
    }
}

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use crate::models::error::{internal, not_found};
use crate::models::{DocumentAddress, DocumentBody, PutOutcome, StoredDocument};
use crate::persistence::{DocumentStore, PersistenceResult};
use crate::query::Query;

#[derive(Default)]
pub struct InMemoryDocumentStore {
    state: Mutex<StoreState>,
}

#[derive(Default)]
struct StoreState {
    collections: HashMap<(String, String), BTreeMap<String, VersionedBody>>,
}

struct VersionedBody {
    body: DocumentBody,
    version: u64,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> PersistenceResult<usize> {
        let state = self.lock_state()?;
        Ok(state.collections.values().map(BTreeMap::len).sum())
    }

    pub fn is_empty(&self) -> PersistenceResult<bool> {
        Ok(self.len()? == 0)
    }

    fn lock_state(&self) -> PersistenceResult<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| internal("in-memory document store mutex poisoned"))
    }
}

impl StoreState {
    fn slot(&self, address: &DocumentAddress) -> Option<&VersionedBody> {
        self.collections
            .get(&collection_key(&address.index, &address.doc_type))
            .and_then(|documents| documents.get(&address.id))
    }

    fn write(&mut self, address: &DocumentAddress, body: &DocumentBody) -> u64 {
        let documents = self
            .collections
            .entry(collection_key(&address.index, &address.doc_type))
            .or_default();
        let version = documents
            .get(&address.id)
            .map(|existing| existing.version.saturating_add(1))
            .unwrap_or(1);
        documents.insert(
            address.id.clone(),
            VersionedBody {
                body: body.clone(),
                version,
            },
        );
        version
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, address: &DocumentAddress) -> PersistenceResult<StoredDocument> {
        let state = self.lock_state()?;
        let slot = state.slot(address).ok_or_else(|| not_found(address))?;
        Ok(StoredDocument {
            id: address.id.clone(),
            body: slot.body.clone(),
            version: slot.version,
        })
    }

    fn put(&self, address: &DocumentAddress, body: &DocumentBody) -> PersistenceResult<u64> {
        let mut state = self.lock_state()?;
        Ok(state.write(address, body))
    }

    fn put_if_version(
        &self,
        address: &DocumentAddress,
        body: &DocumentBody,
        expected_version: u64,
    ) -> PersistenceResult<PutOutcome> {
        let mut state = self.lock_state()?;
        let current = state.slot(address).ok_or_else(|| not_found(address))?.version;
        if current != expected_version {
            return Ok(PutOutcome::VersionConflict { current });
        }
        Ok(PutOutcome::Written {
            version: state.write(address, body),
        })
    }

    fn search(
        &self,
        index: &str,
        doc_type: &str,
        query: &Query,
        limit: usize,
    ) -> PersistenceResult<Vec<StoredDocument>> {
        let state = self.lock_state()?;
        let Some(documents) = state.collections.get(&collection_key(index, doc_type)) else {
            return Ok(Vec::new());
        };

        Ok(documents
            .iter()
            .filter(|(_, slot)| query.matches(&slot.body))
            .take(limit)
            .map(|(id, slot)| StoredDocument {
                id: id.clone(),
                body: slot.body.clone(),
                version: slot.version,
            })
            .collect())
    }

    fn create(
        &self,
        index: &str,
        doc_type: &str,
        body: &DocumentBody,
    ) -> PersistenceResult<String> {
        let id = Uuid::new_v4().to_string();
        let mut state = self.lock_state()?;
        state.write(&DocumentAddress::new(index, doc_type, id.as_str()), body);
        Ok(id)
    }

    fn delete(&self, address: &DocumentAddress) -> PersistenceResult<bool> {
        let mut state = self.lock_state()?;
        Ok(state
            .collections
            .get_mut(&collection_key(&address.index, &address.doc_type))
            .and_then(|documents| documents.remove(&address.id))
            .is_some())
    }
}

fn collection_key(index: &str, doc_type: &str) -> (String, String) {
    (index.to_string(), doc_type.to_string())
}

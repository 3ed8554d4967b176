use std::sync::Arc;

use serde_json::Value;

use crate::models::{CoreError, CoreErrorKind, CoreResult, DocumentHandle, DocumentReference};
use crate::persistence::DocumentStore;

/// Resolves [`DocumentReference`]s into the text task bodies work on.
///
/// One store read per handle, no caching and no retry.
pub struct Fetcher {
    client: Arc<dyn DocumentStore>,
}

impl Fetcher {
    pub fn new(client: Arc<dyn DocumentStore>) -> Self {
        Self { client }
    }

    pub fn fetch(&self, reference: &DocumentReference) -> CoreResult<String> {
        match reference {
            DocumentReference::Literal(text) => Ok(text.clone()),
            DocumentReference::Handle(handle) => self.fetch_field(handle).map(|value| match value {
                Value::String(text) => text,
                other => other.to_string(),
            }),
        }
    }

    /// Parses a raw JSON reference before fetching it.
    pub fn fetch_json(&self, reference: &Value) -> CoreResult<String> {
        self.fetch(&DocumentReference::from_json(reference)?)
    }

    fn fetch_field(&self, handle: &DocumentHandle) -> CoreResult<Value> {
        let address = handle.address();
        let mut document = self.client.get(&address)?;

        // A `null` field carries no text, same as an absent one.
        document
            .body
            .remove(&handle.field)
            .filter(|value| !value.is_null())
            .ok_or_else(|| {
                CoreError::new(
                    CoreErrorKind::FieldNotFound,
                    format!("document '{address}' has no field '{}'", handle.field),
                )
                .at(&address)
            })
    }
}

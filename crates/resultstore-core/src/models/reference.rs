use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{CoreError, CoreErrorKind, CoreResult, DocumentAddress};

/// Points at one field of one stored document.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentHandle {
    pub index: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub id: String,
    pub field: String,
}

impl DocumentHandle {
    pub fn address(&self) -> DocumentAddress {
        DocumentAddress::new(&self.index, &self.doc_type, &self.id)
    }
}

/// Input handed to a task body: either text that is already in hand, or a
/// handle the [`Fetcher`](crate::fetcher::Fetcher) resolves lazily.
///
/// Serializes as a bare JSON string or as
/// `{"index": .., "type": .., "id": .., "field": ..}`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentReference {
    Literal(String),
    Handle(DocumentHandle),
}

impl DocumentReference {
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    pub fn handle(
        index: impl Into<String>,
        doc_type: impl Into<String>,
        id: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self::Handle(DocumentHandle {
            index: index.into(),
            doc_type: doc_type.into(),
            id: id.into(),
            field: field.into(),
        })
    }

    pub fn from_json(value: &Value) -> CoreResult<Self> {
        match value {
            Value::String(text) => Ok(Self::Literal(text.clone())),
            Value::Object(_) => serde_json::from_value::<DocumentHandle>(value.clone())
                .map(Self::Handle)
                .map_err(|error| {
                    CoreError::new(
                        CoreErrorKind::InvalidReference,
                        format!("malformed document handle: {error}"),
                    )
                }),
            other => Err(CoreError::new(
                CoreErrorKind::InvalidReference,
                format!("document reference must be a string or a handle object, got {other}"),
            )),
        }
    }
}

use thiserror::Error;

use crate::models::DocumentAddress;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    NotFound,
    FieldNotFound,
    StoreUnavailable,
    ConcurrentModification,
    InvalidReference,
    InvalidInput,
    ParseFailure,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub address: Option<DocumentAddress>,
    pub task: Option<String>,
    pub kind: CoreErrorKind,
    pub message: String,
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            address: None,
            task: None,
            kind,
            message: message.into(),
        }
    }

    /// Attaches the document address unless the error already carries one.
    pub fn at(mut self, address: &DocumentAddress) -> Self {
        if self.address.is_none() {
            self.address = Some(address.clone());
        }
        self
    }

    /// Attaches the task name unless the error already carries one.
    pub fn for_task(mut self, task: &str) -> Self {
        if self.task.is_none() {
            self.task = Some(task.to_string());
        }
        self
    }
}

pub(crate) fn not_found(address: &DocumentAddress) -> CoreError {
    CoreError::new(
        CoreErrorKind::NotFound,
        format!("document '{address}' does not exist"),
    )
    .at(address)
}

pub(crate) fn invalid_input(message: impl Into<String>) -> CoreError {
    CoreError::new(CoreErrorKind::InvalidInput, message)
}

pub(crate) fn parse_failure(message: impl Into<String>) -> CoreError {
    CoreError::new(CoreErrorKind::ParseFailure, message)
}

pub(crate) fn internal(message: impl Into<String>) -> CoreError {
    CoreError::new(CoreErrorKind::Internal, message)
}

pub mod document;
pub mod error;
pub mod reference;
pub mod task_result;

pub use document::{DocumentAddress, DocumentBody, PutOutcome, StoredDocument};
pub use error::{CoreError, CoreErrorKind, CoreResult};
pub use reference::{DocumentHandle, DocumentReference};
pub use task_result::{ResultsContainer, TaskResult};

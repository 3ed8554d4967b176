//! On-document representation of stored task results.
//!
//! Every document may carry one reserved field, [`RESULTS_FIELD`], holding a
//! map of task name to `{"data": .., "timestamp": ..}`. Callers must not use
//! that field name for their own data.

use serde_json::Value;

use crate::models::error::{internal, parse_failure};
use crate::models::{CoreResult, DocumentBody, ResultsContainer, TaskResult};

pub const RESULTS_FIELD: &str = "xtas_results";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedDocument {
    pub user_fields: DocumentBody,
    pub results: ResultsContainer,
    /// Container entries that are not a `{data, timestamp}` pair. They are
    /// written back verbatim so a write to one slot never depends on the
    /// others being well-formed.
    pub unreadable: DocumentBody,
}

/// Splits a raw body into user fields and the results container.
///
/// A missing or `null` reserved field decodes as an empty container. Only a
/// reserved field that is not a map at all is a `ParseFailure`.
pub fn decode(mut body: DocumentBody) -> CoreResult<DecodedDocument> {
    let (results, unreadable) = match body.remove(RESULTS_FIELD) {
        Some(raw) => split_container(raw)?,
        None => (ResultsContainer::new(), DocumentBody::new()),
    };

    Ok(DecodedDocument {
        user_fields: body,
        results,
        unreadable,
    })
}

/// Reads only the well-formed entries of the results container, leaving the
/// body untouched.
pub fn decode_results(body: &DocumentBody) -> CoreResult<ResultsContainer> {
    match body.get(RESULTS_FIELD) {
        Some(raw) => split_container(raw.clone()).map(|(results, _)| results),
        None => Ok(ResultsContainer::new()),
    }
}

/// Reassembles a full body. The reserved field is left out entirely when the
/// container has no entries. A decoded result replaces an unreadable entry of
/// the same name.
pub fn encode(document: DecodedDocument) -> CoreResult<DocumentBody> {
    let DecodedDocument {
        mut user_fields,
        results,
        unreadable: mut container,
    } = document;

    if results.is_empty() && container.is_empty() {
        user_fields.remove(RESULTS_FIELD);
        return Ok(user_fields);
    }

    for (task_name, result) in results {
        let entry = serde_json::to_value(result).map_err(|error| {
            internal(format!("failed to serialize result of task '{task_name}': {error}"))
        })?;
        container.insert(task_name, entry);
    }
    user_fields.insert(RESULTS_FIELD.to_string(), Value::Object(container));
    Ok(user_fields)
}

fn split_container(raw: Value) -> CoreResult<(ResultsContainer, DocumentBody)> {
    let entries = match raw {
        Value::Null => return Ok((ResultsContainer::new(), DocumentBody::new())),
        Value::Object(entries) => entries,
        _ => {
            return Err(parse_failure(format!(
                "reserved field '{RESULTS_FIELD}' is not a task result map"
            )));
        }
    };

    let mut results = ResultsContainer::new();
    let mut unreadable = DocumentBody::new();
    for (task_name, entry) in entries {
        match serde_json::from_value::<TaskResult>(entry.clone()) {
            Ok(result) => {
                results.insert(task_name, result);
            }
            Err(error) => {
                tracing::warn!(
                    task = %task_name,
                    error = %error,
                    "keeping unreadable task result entry as-is"
                );
                unreadable.insert(task_name, entry);
            }
        }
    }

    Ok((results, unreadable))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{DecodedDocument, RESULTS_FIELD, decode, decode_results, encode};
    use crate::models::{CoreErrorKind, DocumentBody, ResultsContainer, TaskResult};

    fn body(value: serde_json::Value) -> DocumentBody {
        value.as_object().cloned().expect("test body must be an object")
    }

    #[test]
    fn document_without_results_decodes_to_empty_container() {
        let decoded = decode(body(json!({"text": "test"}))).unwrap();

        assert!(decoded.results.is_empty());
        assert_eq!(decoded.user_fields, body(json!({"text": "test"})));
    }

    #[test]
    fn null_results_field_is_treated_as_absent() {
        let decoded = decode(body(json!({"text": "test", RESULTS_FIELD: null}))).unwrap();

        assert!(decoded.results.is_empty());
        assert!(!decoded.user_fields.contains_key(RESULTS_FIELD));
    }

    #[test]
    fn empty_container_is_omitted_on_encode() {
        let encoded = encode(DecodedDocument {
            user_fields: body(json!({"text": "test"})),
            ..DecodedDocument::default()
        })
        .unwrap();
        assert_eq!(encoded, body(json!({"text": "test"})));
    }

    #[test]
    fn encode_then_decode_preserves_fields_and_results() {
        let mut results = ResultsContainer::new();
        results.insert(
            "tokenize".to_string(),
            TaskResult::new(json!([{"token": "a"}]), "2024-01-01T00:00:00Z"),
        );
        let user_fields = body(json!({"text": "a", "meta": {"lang": "en"}}));

        let encoded = encode(DecodedDocument {
            user_fields: user_fields.clone(),
            results: results.clone(),
            ..DecodedDocument::default()
        })
        .unwrap();
        assert_eq!(
            encoded[RESULTS_FIELD]["tokenize"]["timestamp"],
            json!("2024-01-01T00:00:00Z")
        );

        let decoded = decode(encoded).unwrap();
        assert_eq!(decoded.user_fields, user_fields);
        assert_eq!(decoded.results, results);
    }

    #[test]
    fn non_map_container_is_a_parse_failure() {
        let error = decode(body(json!({"text": "x", RESULTS_FIELD: "oops"}))).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::ParseFailure);

        let error = decode_results(&body(json!({RESULTS_FIELD: [1, 2]}))).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::ParseFailure);
    }

    #[test]
    fn malformed_entries_are_set_aside_and_written_back() {
        let raw = body(json!({
            "text": "x",
            RESULTS_FIELD: {
                "broken": {"data": 1},
                "ok": {"data": 2, "timestamp": "2024-01-01T00:00:00Z"}
            }
        }));

        let readable = decode_results(&raw).unwrap();
        assert_eq!(readable.keys().collect::<Vec<_>>(), vec!["ok"]);

        let decoded = decode(raw.clone()).unwrap();
        assert_eq!(decoded.unreadable, body(json!({"broken": {"data": 1}})));
        assert_eq!(encode(decoded).unwrap(), raw);
    }

    #[test]
    fn decoded_result_replaces_unreadable_entry_of_same_name() {
        let mut decoded = decode(body(json!({RESULTS_FIELD: {"t": "junk"}}))).unwrap();
        decoded.results.insert(
            "t".to_string(),
            TaskResult::new(json!(1), "2024-01-01T00:00:00Z"),
        );

        let encoded = encode(decoded).unwrap();
        assert_eq!(
            encoded[RESULTS_FIELD],
            json!({"t": {"data": 1, "timestamp": "2024-01-01T00:00:00Z"}})
        );
    }
}

//! Query expressions evaluated against document bodies.
//!
//! Queries are written in the Elasticsearch query JSON dialect callers already
//! use for the document store, restricted to the clauses below:
//!
//! - `{"match_all": {}}`
//! - `{"term": {"field": value}}` or `{"term": {"field": {"value": value}}}`
//! - `{"terms": {"field": [value, ...]}}`
//! - `{"match": {"field": "text"}}` or `{"match": {"field": {"query": "text"}}}`
//! - `{"exists": {"field": "name"}}`
//! - `{"bool": {"must": .., "filter": .., "should": .., "must_not": ..}}`
//!
//! Field names are dotted paths. A bare name that is not a top-level key also
//! resolves to any nested key of that name, the way older Elasticsearch
//! releases resolved short field names.

use serde_json::{Map, Value};

use crate::models::error::invalid_input;
use crate::models::{CoreResult, DocumentBody};

#[derive(Clone, Debug, PartialEq)]
pub enum Query {
    MatchAll,
    Term {
        field: String,
        value: Value,
    },
    Terms {
        field: String,
        values: Vec<Value>,
    },
    Match {
        field: String,
        text: String,
    },
    Exists {
        field: String,
    },
    Bool {
        must: Vec<Query>,
        should: Vec<Query>,
        must_not: Vec<Query>,
    },
}

impl Query {
    pub fn match_all() -> Self {
        Self::MatchAll
    }

    pub fn term(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matching(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Match {
            field: field.into(),
            text: text.into(),
        }
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Self::Exists {
            field: field.into(),
        }
    }

    pub fn from_json(value: &Value) -> CoreResult<Self> {
        let (clause, body) = single_entry(value, "query")?;

        match clause.as_str() {
            "match_all" => Ok(Self::MatchAll),
            "term" => {
                let (field, raw) = single_entry(body, "term")?;
                let value = match raw {
                    Value::Object(options) => options
                        .get("value")
                        .cloned()
                        .ok_or_else(|| invalid_input("term clause object requires 'value'"))?,
                    other => other.clone(),
                };
                Ok(Self::Term { field, value })
            }
            "terms" => {
                let (field, raw) = single_entry(body, "terms")?;
                let values = raw
                    .as_array()
                    .cloned()
                    .ok_or_else(|| invalid_input("terms clause requires an array of values"))?;
                Ok(Self::Terms { field, values })
            }
            "match" => {
                let (field, raw) = single_entry(body, "match")?;
                let text = match raw {
                    Value::Object(options) => options
                        .get("query")
                        .map(scalar_text)
                        .ok_or_else(|| invalid_input("match clause object requires 'query'"))?,
                    other => scalar_text(other),
                };
                Ok(Self::Match { field, text })
            }
            "exists" => {
                let field = body
                    .get("field")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid_input("exists clause requires a 'field' string"))?;
                Ok(Self::exists(field))
            }
            "bool" => {
                let options = body
                    .as_object()
                    .ok_or_else(|| invalid_input("bool clause must be an object"))?;
                let mut must = clauses(options, "must")?;
                must.extend(clauses(options, "filter")?);
                Ok(Self::Bool {
                    must,
                    should: clauses(options, "should")?,
                    must_not: clauses(options, "must_not")?,
                })
            }
            other => Err(invalid_input(format!("unsupported query clause '{other}'"))),
        }
    }

    pub fn matches(&self, body: &DocumentBody) -> bool {
        match self {
            Self::MatchAll => true,
            Self::Term { field, value } => resolve(body, field).into_iter().any(|v| v == value),
            Self::Terms { field, values } => resolve(body, field)
                .into_iter()
                .any(|v| values.contains(v)),
            Self::Match { field, text } => {
                let wanted = analyze(text);
                if wanted.is_empty() {
                    return false;
                }
                resolve(body, field)
                    .into_iter()
                    .flat_map(|v| analyze(&scalar_text(v)))
                    .any(|token| wanted.contains(&token))
            }
            Self::Exists { field } => resolve(body, field).into_iter().any(|v| !v.is_null()),
            Self::Bool {
                must,
                should,
                must_not,
            } => {
                if !must.iter().all(|q| q.matches(body)) {
                    return false;
                }
                if must_not.iter().any(|q| q.matches(body)) {
                    return false;
                }
                // Without a `must`, at least one `should` has to hold.
                should.is_empty() || !must.is_empty() || should.iter().any(|q| q.matches(body))
            }
        }
    }
}

impl TryFrom<&Value> for Query {
    type Error = crate::models::CoreError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Self::from_json(value)
    }
}

fn single_entry<'a>(value: &'a Value, what: &str) -> CoreResult<(String, &'a Value)> {
    let object = value
        .as_object()
        .ok_or_else(|| invalid_input(format!("{what} clause must be a JSON object")))?;
    let mut entries = object.iter();
    match (entries.next(), entries.next()) {
        (Some((key, inner)), None) => Ok((key.clone(), inner)),
        _ => Err(invalid_input(format!(
            "{what} clause must contain exactly one key"
        ))),
    }
}

fn clauses(options: &Map<String, Value>, key: &str) -> CoreResult<Vec<Query>> {
    match options.get(key) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(Query::from_json).collect(),
        Some(single) => Ok(vec![Query::from_json(single)?]),
    }
}

/// Collects every leaf value addressed by `field`, flattening arrays along
/// the way.
fn resolve<'a>(body: &'a DocumentBody, field: &str) -> Vec<&'a Value> {
    let mut found = Vec::new();
    let segments: Vec<&str> = field.split('.').collect();

    if let Some((first, rest)) = segments.split_first()
        && let Some(value) = body.get(*first)
    {
        collect_path(value, rest, &mut found);
    }

    if found.is_empty() && segments.len() == 1 && !body.contains_key(field) {
        for value in body.values() {
            collect_named(value, field, &mut found);
        }
    }

    found
}

fn collect_path<'a>(value: &'a Value, rest: &[&str], found: &mut Vec<&'a Value>) {
    match (value, rest.split_first()) {
        (Value::Array(items), _) => {
            for item in items {
                collect_path(item, rest, found);
            }
        }
        (_, None) => found.push(value),
        (Value::Object(object), Some((next, tail))) => {
            if let Some(inner) = object.get(*next) {
                collect_path(inner, tail, found);
            }
        }
        _ => {}
    }
}

fn collect_named<'a>(value: &'a Value, name: &str, found: &mut Vec<&'a Value>) {
    match value {
        Value::Object(object) => {
            for (key, inner) in object {
                if key == name {
                    collect_path(inner, &[], found);
                } else {
                    collect_named(inner, name, found);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_named(item, name, found);
            }
        }
        _ => {}
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn analyze(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Query;
    use crate::models::{CoreErrorKind, DocumentBody};

    fn doc(value: serde_json::Value) -> DocumentBody {
        value.as_object().cloned().expect("test body must be an object")
    }

    fn parse(value: serde_json::Value) -> Query {
        Query::from_json(&value).expect("query should parse")
    }

    #[test]
    fn term_matches_exact_value_only() {
        let query = parse(json!({"term": {"test": "batch"}}));

        assert!(query.matches(&doc(json!({"test": "batch"}))));
        assert!(!query.matches(&doc(json!({"test": "Batch"}))));
        assert!(!query.matches(&doc(json!({"other": "batch"}))));
    }

    #[test]
    fn term_accepts_value_object_and_array_fields() {
        let query = parse(json!({"term": {"tags": {"value": "nlp"}}}));
        assert!(query.matches(&doc(json!({"tags": ["ml", "nlp"]}))));
    }

    #[test]
    fn match_is_case_insensitive_and_tokenized() {
        let query = parse(json!({"match": {"text": {"query": "Test"}}}));

        assert!(query.matches(&doc(json!({"text": "a small test, nothing more"}))));
        assert!(!query.matches(&doc(json!({"text": "testing"}))));
    }

    #[test]
    fn dotted_paths_reach_nested_fields() {
        let query = parse(json!({"match": {"meta.lang": "en"}}));
        assert!(query.matches(&doc(json!({"meta": {"lang": "EN"}}))));
    }

    #[test]
    fn bare_names_resolve_to_nested_leaves() {
        let query = parse(json!({"match": {"b": {"query": "c"}}}));
        let body = doc(json!({
            "text": "test",
            "xtas_results": {"task2": {"data": {"a": {"b": ["c", "d"]}}, "timestamp": "t"}}
        }));

        assert!(query.matches(&body));
        assert!(!query.matches(&doc(json!({"text": "test"}))));
    }

    #[test]
    fn exists_ignores_null_values() {
        let query = parse(json!({"exists": {"field": "text"}}));

        assert!(query.matches(&doc(json!({"text": ""}))));
        assert!(!query.matches(&doc(json!({"text": null}))));
    }

    #[test]
    fn bool_combines_clauses() {
        let query = parse(json!({"bool": {
            "must": {"term": {"test": "batch"}},
            "must_not": [{"exists": {"field": "skip"}}],
        }}));

        assert!(query.matches(&doc(json!({"test": "batch"}))));
        assert!(!query.matches(&doc(json!({"test": "batch", "skip": true}))));

        let should_only = parse(json!({"bool": {"should": [
            {"term": {"lang": "en"}},
            {"term": {"lang": "nl"}},
        ]}}));
        assert!(should_only.matches(&doc(json!({"lang": "nl"}))));
        assert!(!should_only.matches(&doc(json!({"lang": "de"}))));
    }

    #[test]
    fn unsupported_clause_is_invalid_input() {
        let error = Query::from_json(&json!({"fuzzy": {"text": "tst"}})).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);

        let error = Query::from_json(&json!({"term": {}, "match": {}})).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
    }
}

use std::sync::Arc;

use serde_json::{Value, json};

use resultstore_core::codec::RESULTS_FIELD;
use resultstore_core::models::{CoreErrorKind, DocumentAddress, DocumentBody};
use resultstore_core::persistence::{DocumentStore, InMemoryDocumentStore};
use resultstore_core::query::Query;
use resultstore_core::store::{ResultStore, TaskSelection};

const INDEX: &str = "resultstore__unittest";
const DOC_TYPE: &str = "unittest_doc";

fn body(value: Value) -> DocumentBody {
    value.as_object().cloned().expect("test body must be an object")
}

fn setup() -> (Arc<InMemoryDocumentStore>, ResultStore) {
    let documents = Arc::new(InMemoryDocumentStore::new());
    let store = ResultStore::new(documents.clone());
    (documents, store)
}

fn index_document(documents: &InMemoryDocumentStore, value: Value) -> DocumentAddress {
    let id = documents.create(INDEX, DOC_TYPE, &body(value)).unwrap();
    DocumentAddress::new(INDEX, DOC_TYPE, id)
}

#[test]
fn results_can_be_stored_and_retrieved() {
    let (documents, store) = setup();
    let address = index_document(&documents, json!({"text": "test"}));

    assert_eq!(store.get_single_result("task1", &address).unwrap(), None);

    store.store_single("task1_result", "task1", &address).unwrap();
    documents.flush().unwrap();
    assert_eq!(
        store.get_single_result("task1", &address).unwrap(),
        Some(json!("task1_result"))
    );
    assert!(
        store
            .get_tasks_per_index(INDEX, DOC_TYPE)
            .unwrap()
            .contains("task1")
    );

    let task2_result = json!({"a": {"b": ["c", "d"]}});
    store
        .store_single(task2_result.clone(), "task2", &address)
        .unwrap();
    assert_eq!(
        store.get_single_result("task1", &address).unwrap(),
        Some(json!("task1_result"))
    );
    assert_eq!(
        store.get_single_result("task2", &address).unwrap(),
        Some(task2_result.clone())
    );

    let query = Query::from_json(&json!({"match": {"b": {"query": "c"}}})).unwrap();
    assert_eq!(
        store
            .fetch_documents_by_task(INDEX, DOC_TYPE, &query, "task2")
            .unwrap()
            .len(),
        1
    );

    let query = Query::from_json(&json!({"match": {"text": {"query": "test"}}})).unwrap();
    assert_eq!(
        store
            .fetch_results_by_document(INDEX, DOC_TYPE, &query, "task2")
            .unwrap(),
        vec![task2_result.clone()]
    );

    let details = store
        .fetch_query_details_batch(INDEX, DOC_TYPE, &query, &TaskSelection::All)
        .unwrap();
    assert!(details[0].1.contains_key("task1"));
    assert!(details[0].1.contains_key("task2"));

    let details = store
        .fetch_query_details_batch(INDEX, DOC_TYPE, &query, &TaskSelection::named(["task2"]))
        .unwrap();
    assert!(details[0].1.contains_key("task2"));
    assert!(!details[0].1.contains_key("task1"));

    store.store_single("task1_result2", "task1", &address).unwrap();
    assert_eq!(
        store.get_single_result("task1", &address).unwrap(),
        Some(json!("task1_result2"))
    );
    assert_eq!(
        store.get_single_result("task2", &address).unwrap(),
        Some(task2_result)
    );

    let source = documents.get(&address).unwrap().body;
    assert_eq!(source["text"], json!("test"));
}

#[test]
fn store_single_echoes_its_input() {
    let (documents, store) = setup();
    let address = index_document(&documents, json!({"text": "echo"}));

    let tokens = vec!["a".to_string(), "b".to_string()];
    let echoed = store.store_single(tokens.clone(), "tokenize", &address).unwrap();

    assert_eq!(echoed, tokens);
    assert_eq!(
        store
            .get_single_result_as::<Vec<String>>("tokenize", &address)
            .unwrap(),
        Some(tokens)
    );
}

#[test]
fn storing_leaves_every_user_field_untouched() {
    let (documents, store) = setup();
    let original = json!({
        "text": "Some text",
        "meta": {"lang": "en", "tags": ["x", "y"]},
        "count": 3,
    });
    let address = index_document(&documents, original.clone());

    store.store_single(json!([1, 2, 3]), "count_words", &address).unwrap();
    store.store_single(json!(null), "nothing", &address).unwrap();

    let mut stored = documents.get(&address).unwrap().body;
    let results = stored.remove(RESULTS_FIELD).expect("results field present");
    assert_eq!(stored, body(original));
    assert_eq!(results["count_words"]["data"], json!([1, 2, 3]));
    assert!(results["count_words"]["timestamp"].is_string());
}

#[test]
fn stored_result_carries_write_timestamp() {
    let (documents, store) = setup();
    let address = index_document(&documents, json!({"text": "t"}));

    store.store_single(json!("first"), "task", &address).unwrap();
    let first = store.get_task_result("task", &address).unwrap().unwrap();
    store.store_single(json!("second"), "task", &address).unwrap();
    let second = store.get_task_result("task", &address).unwrap().unwrap();

    assert_eq!(second.data, json!("second"));
    let (first_at, second_at) = (first.written_at().unwrap(), second.written_at().unwrap());
    assert!(second_at >= first_at);
}

#[test]
fn storing_on_a_missing_document_is_not_found() {
    let (_documents, store) = setup();
    let address = DocumentAddress::new(INDEX, DOC_TYPE, "missing");

    let error = store.store_single("x", "task", &address).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::NotFound);
    assert_eq!(error.address, Some(address.clone()));
    assert_eq!(error.task.as_deref(), Some("task"));

    let error = store.get_single_result("task", &address).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::NotFound);
}

#[test]
fn empty_task_name_is_rejected() {
    let (documents, store) = setup();
    let address = index_document(&documents, json!({"text": "t"}));

    let error = store.store_single("x", "  ", &address).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InvalidInput);
    assert!(!documents.get(&address).unwrap().body.contains_key(RESULTS_FIELD));
}

#[test]
fn removing_a_result_keeps_other_tasks() {
    let (documents, store) = setup();
    let address = index_document(&documents, json!({"text": "t"}));

    store.store_single(json!(1), "task1", &address).unwrap();
    store.store_single(json!(2), "task2", &address).unwrap();

    let removed = store.remove_result("task1", &address).unwrap().unwrap();
    assert_eq!(removed.data, json!(1));
    assert_eq!(store.get_single_result("task1", &address).unwrap(), None);
    assert_eq!(store.get_single_result("task2", &address).unwrap(), Some(json!(2)));

    store.remove_result("task2", &address).unwrap();
    assert_eq!(store.remove_result("task2", &address).unwrap(), None);
    assert_eq!(
        documents.get(&address).unwrap().body,
        body(json!({"text": "t"}))
    );
}

#[test]
fn malformed_slot_does_not_block_other_tasks() {
    let (documents, store) = setup();
    let address = DocumentAddress::new(INDEX, DOC_TYPE, "legacy");
    documents
        .put(
            &address,
            &body(json!({"text": "t", RESULTS_FIELD: {"old": {"data": 1}}})),
        )
        .unwrap();

    assert_eq!(store.get_single_result("new", &address).unwrap(), None);
    assert_eq!(store.get_single_result("old", &address).unwrap(), None);

    store.store_single(2, "new", &address).unwrap();
    assert_eq!(
        store.get_single_result("new", &address).unwrap(),
        Some(json!(2))
    );
    let raw = documents.get(&address).unwrap().body;
    assert_eq!(raw[RESULTS_FIELD]["old"], json!({"data": 1}));
    assert_eq!(raw["text"], json!("t"));

    store.store_single("fixed", "old", &address).unwrap();
    assert_eq!(
        store.get_single_result("old", &address).unwrap(),
        Some(json!("fixed"))
    );
    assert_eq!(
        store.get_tasks_per_index(INDEX, DOC_TYPE).unwrap().len(),
        2
    );
}

#[test]
fn removing_a_malformed_slot_drops_it() {
    let (documents, store) = setup();
    let address = DocumentAddress::new(INDEX, DOC_TYPE, "legacy");
    documents
        .put(&address, &body(json!({"text": "t", RESULTS_FIELD: {"old": "junk"}})))
        .unwrap();

    assert_eq!(store.remove_result("old", &address).unwrap(), None);
    assert_eq!(
        documents.get(&address).unwrap().body,
        body(json!({"text": "t"}))
    );
}

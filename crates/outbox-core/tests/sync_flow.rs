//! End-to-end flows against a scripted transport and the in-memory store.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use outbox_core::{
    ApplyState, ModelConf, Outbox, OutboxConfig, RetryPolicy, SaveOptions, StorageMode,
    MISSING_DATA_LABEL,
};
use outbox_storage::{MemoryStore, PayloadStore, StorageError, StorageResult};
use outbox_transport::{
    FormValue, Method, RequestBody, Transport, TransportError, TransportRequest, TransportResult,
};
use serde_json::{json, Value};

enum Scripted {
    Ok(Option<Value>),
    Status(u16, Option<String>),
}

struct ScriptedTransport {
    requests: StdMutex<Vec<TransportRequest>>,
    script: StdMutex<VecDeque<Scripted>>,
    fallback: Scripted,
}

impl ScriptedTransport {
    fn new(fallback: Scripted) -> Arc<Self> {
        Arc::new(Self {
            requests: StdMutex::new(Vec::new()),
            script: StdMutex::new(VecDeque::new()),
            fallback,
        })
    }

    fn push(&self, response: Scripted) {
        self.script.lock().unwrap().push_back(response);
    }

    fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> TransportResult<Option<Value>> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        let response = next.as_ref().unwrap_or(&self.fallback);
        match response {
            Scripted::Ok(value) => Ok(value.clone()),
            Scripted::Status(status, body) => Err(TransportError::Status {
                status: *status,
                body: body.clone(),
            }),
        }
    }
}

struct FailingStore;

#[async_trait]
impl PayloadStore for FailingStore {
    async fn get_item(&self, _key: &str) -> StorageResult<Option<Value>> {
        Ok(None)
    }
    async fn set_item(&self, _key: &str, _value: &Value) -> StorageResult<()> {
        Err(StorageError::Backend("disk full".into()))
    }
    async fn remove_item(&self, _key: &str) -> StorageResult<()> {
        Ok(())
    }
    async fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(Vec::new())
    }
}

fn config() -> OutboxConfig {
    OutboxConfig::new("https://api.test")
}

fn recording_outbox(
    config: OutboxConfig,
    transport: Arc<ScriptedTransport>,
) -> (Arc<Outbox>, Arc<StdMutex<Vec<String>>>) {
    let actions = Arc::new(StdMutex::new(Vec::new()));
    let log = Arc::clone(&actions);
    let outbox = Outbox::new(config, Arc::new(MemoryStore::new()), transport)
        .with_on_action(move |action_type, _payload| {
            log.lock().unwrap().push(action_type.to_string());
        });
    (Arc::new(outbox), actions)
}

fn item_options() -> SaveOptions {
    SaveOptions {
        url: Some("items".into()),
        model: Some(ModelConf {
            name: "item".into(),
            url: Some("items".into()),
            list: true,
        }),
        ..Default::default()
    }
}

fn form_text(request: &TransportRequest, name: &str) -> Option<String> {
    match &request.body {
        RequestBody::Form(fields) => fields.iter().find(|f| f.name == name).and_then(|f| {
            match &f.value {
                FormValue::Text(text) => Some(text.clone()),
                FormValue::File { .. } => None,
            }
        }),
        _ => None,
    }
}

#[tokio::test]
async fn create_syncs_and_commits_update() {
    let transport = ScriptedTransport::new(Scripted::Ok(Some(json!({"id": 1, "name": "Test"}))));
    let (outbox, actions) = recording_outbox(config(), Arc::clone(&transport));

    let item = outbox
        .save(json!({"name": "Test"}), item_options())
        .await
        .unwrap()
        .expect("save should queue an item");
    assert_eq!(item.id, 1);
    assert_eq!(item.label, "Unsynced Item #1");
    assert!(!item.synced);

    outbox.process_pending().await;

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://api.test/items");
    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(form_text(&requests[0], "name").as_deref(), Some("Test"));

    let item = outbox.load_item(1).await.unwrap();
    assert!(item.synced);
    assert_eq!(item.result, Some(json!({"id": 1, "name": "Test"})));
    assert_eq!(outbox.unsynced(None).await, 0);

    assert_eq!(
        *actions.lock().unwrap(),
        vec!["ITEM_SUBMIT".to_string(), "ITEM_UPDATE".to_string()]
    );
}

#[tokio::test]
async fn immediate_parent_resolves_child_placeholder() {
    let transport = ScriptedTransport::new(Scripted::Ok(None));
    transport.push(Scripted::Ok(Some(json!({"id": 42, "name": "P"}))));
    transport.push(Scripted::Ok(Some(json!({"id": 43, "type_id": 42}))));
    let (outbox, actions) = recording_outbox(config(), Arc::clone(&transport));

    let mut parent_options = item_options();
    parent_options.apply_state = Some(ApplyState::Immediate);
    outbox
        .save(json!({"name": "P"}), parent_options)
        .await
        .unwrap()
        .expect("parent should queue");

    let child = outbox
        .save(json!({"name": "C", "type_id": "outbox-1"}), item_options())
        .await
        .unwrap()
        .expect("child should queue");
    assert_eq!(child.parents, vec![1]);

    outbox.process_pending().await;

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    // The child went out with the committed server id, not the placeholder.
    assert_eq!(form_text(&requests[1], "type_id").as_deref(), Some("42"));

    let child = outbox.load_item(child.id).await.unwrap();
    assert!(child.synced);
    assert!(child.parents.is_empty());

    let log = actions.lock().unwrap();
    // Optimistic update carries the placeholder id before any network work.
    assert_eq!(
        *log,
        vec![
            "ITEM_UPDATE".to_string(),  // optimistic parent apply
            "ITEM_SUBMIT".to_string(),  // child queued
            "ITEM_SUCCESS".to_string(), // parent commit
            "ITEM_UPDATE".to_string(),  // child commit
        ]
    );
}

#[tokio::test]
async fn batch_zips_responses_positionally() {
    let mut config = config();
    config.batch_service = Some("batch".into());
    let transport = ScriptedTransport::new(Scripted::Ok(None));
    transport.push(Scripted::Ok(Some(json!([
        {"status_code": 201, "body": r#"{"id": 1}"#},
        {"status_code": 201, "body": r#"{"id": 2}"#},
        {"status_code": 400, "body": r#"{"name": ["required"]}"#},
    ]))));
    let (outbox, _actions) = recording_outbox(config, Arc::clone(&transport));

    for name in ["a", "b", "c"] {
        outbox
            .save(json!({"name": name}), item_options())
            .await
            .unwrap();
    }
    outbox.process_pending().await;

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://api.test/batch");
    match &requests[0].body {
        RequestBody::Json(Value::Array(entries)) => {
            assert_eq!(entries.len(), 3);
            assert_eq!(entries[0]["url"], "https://api.test/items");
            assert_eq!(entries[0]["method"], "POST");
            assert_eq!(entries[0]["body"], r#"{"name":"a"}"#);
        }
        other => panic!("expected JSON array body, got {other:?}"),
    }

    assert!(outbox.load_item(1).await.unwrap().synced);
    assert!(outbox.load_item(2).await.unwrap().synced);
    let failed = outbox.load_item(3).await.unwrap();
    assert!(!failed.synced);
    let error = failed.error.unwrap();
    assert_eq!(error.status, Some(400));
    assert_eq!(error.json, Some(json!({"name": ["required"]})));

    // The failed member stays listed but is no longer pending.
    assert_eq!(outbox.unsynced(None).await, 1);
    assert!(outbox.pending_items(None).await.is_empty());
}

#[tokio::test]
async fn transient_failures_back_off_then_discard_at_cap() {
    let mut config = config();
    config.retry = RetryPolicy {
        backoff_base: Duration::from_millis(1),
        backoff_max: Duration::from_millis(5),
        max_retries: 2,
    };
    let transport = ScriptedTransport::new(Scripted::Status(503, None));
    let (outbox, actions) = recording_outbox(config, Arc::clone(&transport));
    Arc::clone(&outbox).start();

    let item = outbox
        .save(json!({"name": "flaky"}), item_options())
        .await
        .unwrap()
        .expect("save should queue");

    let settled = outbox.wait_for_item(item.id).await.unwrap();
    assert!(!settled.synced);
    assert_eq!(settled.error.unwrap().status, Some(503));

    // Initial attempt plus max_retries, then rolled back.
    assert_eq!(transport.request_count(), 3);
    assert!(actions
        .lock()
        .unwrap()
        .contains(&"ITEM_ERROR".to_string()));
}

#[tokio::test]
async fn client_errors_discard_without_retry() {
    let transport =
        ScriptedTransport::new(Scripted::Status(400, Some(r#"{"name": ["required"]}"#.into())));
    let (outbox, actions) = recording_outbox(config(), Arc::clone(&transport));

    let item = outbox
        .save(json!({}), item_options())
        .await
        .unwrap()
        .expect("save should queue");
    outbox.process_pending().await;

    assert_eq!(transport.request_count(), 1);
    let item = outbox.load_item(item.id).await.unwrap();
    let error = item.error.unwrap();
    assert_eq!(error.status, Some(400));
    assert_eq!(error.json, Some(json!({"name": ["required"]})));
    assert_eq!(
        *actions.lock().unwrap(),
        vec!["ITEM_SUBMIT".to_string(), "ITEM_ERROR".to_string()]
    );
}

#[tokio::test]
async fn delete_without_body_commits_target_id() {
    let transport = ScriptedTransport::new(Scripted::Ok(None));
    let (outbox, actions) = recording_outbox(config(), Arc::clone(&transport));

    let mut options = item_options();
    options.method = Some(Method::Delete);
    options.url = Some("items/5".into());
    let item = outbox
        .save(json!({}), options)
        .await
        .unwrap()
        .expect("delete should queue");
    assert_eq!(item.deleted_id, Some(json!(5)));

    outbox.process_pending().await;

    let requests = transport.requests();
    assert_eq!(requests[0].method, Method::Delete);
    assert_eq!(requests[0].url, "https://api.test/items/5");
    assert_eq!(requests[0].body, RequestBody::Empty);

    let item = outbox.load_item(item.id).await.unwrap();
    assert!(item.synced);
    assert_eq!(item.result, Some(json!(5)));
    assert_eq!(
        *actions.lock().unwrap(),
        vec!["ITEM_DELETESUBMIT".to_string(), "ITEM_DELETE".to_string()]
    );
}

#[tokio::test]
async fn csrf_token_travels_as_header_and_form_field() {
    let transport = ScriptedTransport::new(Scripted::Ok(Some(json!({"id": 1}))));
    let (outbox, _actions) = recording_outbox(config(), Arc::clone(&transport));

    outbox.set_csrf_token(Some("token123".into())).await;
    outbox.save(json!({"name": "a"}), item_options()).await.unwrap();
    outbox.process_pending().await;

    let requests = transport.requests();
    assert!(requests[0]
        .headers
        .iter()
        .any(|(k, v)| k == "X-CSRFToken" && v == "token123"));
    assert_eq!(
        form_text(&requests[0], "csrfmiddlewaretoken").as_deref(),
        Some("token123")
    );
}

#[tokio::test]
async fn temporary_storage_forces_single_attempt() {
    let transport = ScriptedTransport::new(Scripted::Status(503, None));
    let (outbox, _actions) = recording_outbox(config(), Arc::clone(&transport));

    let mut options = item_options();
    options.storage = StorageMode::Temporary;
    let item = outbox
        .save(json!({"name": "ephemeral"}), options)
        .await
        .unwrap()
        .expect("save should queue");

    outbox.process_pending().await;

    // `once` is in force: one attempt, then rolled back for good.
    assert_eq!(transport.request_count(), 1);
    let item = outbox.load_item(item.id).await.unwrap();
    assert!(!item.synced);
    assert!(item.error.is_some());
}

#[tokio::test]
async fn persistent_write_failure_falls_back_to_temporary() {
    let transport = ScriptedTransport::new(Scripted::Ok(Some(json!({"id": 1}))));
    let outbox = Outbox::new(config(), Arc::new(FailingStore), transport);

    let mut options = item_options();
    options.storage = StorageMode::Persistent;
    let item = outbox
        .save(json!({"name": "big"}), options)
        .await
        .unwrap()
        .expect("save should queue despite the store failure");

    assert_eq!(item.options.storage, StorageMode::Temporary);
    assert_eq!(item.options.desired_storage, Some(StorageMode::Persistent));
    // Payload still loads, from the in-memory fallback.
    assert_eq!(item.data, Some(json!({"name": "big"})));
    // Fallback items stay visible in unsynced listings.
    assert_eq!(outbox.unsynced(None).await, 1);
}

#[tokio::test]
async fn restored_state_without_payload_reports_missing() {
    let transport = ScriptedTransport::new(Scripted::Ok(Some(json!({"id": 1}))));
    let (outbox, _actions) = recording_outbox(config(), Arc::clone(&transport));

    let mut options = item_options();
    options.storage = StorageMode::Temporary;
    let item = outbox
        .save(json!({"name": "lost"}), options)
        .await
        .unwrap()
        .expect("save should queue");
    let snapshot = outbox.snapshot().await;

    // A fresh controller (fresh process) has no in-memory payloads.
    let transport2 = ScriptedTransport::new(Scripted::Ok(Some(json!({"id": 1}))));
    let (restored, _actions2) = recording_outbox(config(), Arc::clone(&transport2));
    restored.restore(snapshot).await;

    let loaded = restored.load_item(item.id).await.unwrap();
    assert!(loaded.missing);
    assert_eq!(loaded.label, MISSING_DATA_LABEL);

    restored.process_pending().await;
    // Nothing to send without a payload; the item is rolled back locally.
    assert_eq!(transport2.request_count(), 0);
    let loaded = restored.load_item(item.id).await.unwrap();
    assert_eq!(
        loaded.error.unwrap().text.as_deref(),
        Some(MISSING_DATA_LABEL)
    );
}

#[tokio::test]
async fn wait_for_all_resolves_when_queue_drains() {
    let transport = ScriptedTransport::new(Scripted::Ok(Some(json!({"id": 9}))));
    let (outbox, _actions) = recording_outbox(config(), Arc::clone(&transport));
    Arc::clone(&outbox).start();

    outbox.save(json!({"name": "a"}), item_options()).await.unwrap();
    outbox.save(json!({"name": "b"}), item_options()).await.unwrap();
    outbox.wait_for_all().await;

    assert_eq!(transport.request_count(), 2);
    assert_eq!(outbox.unsynced(None).await, 0);
}

#[tokio::test]
async fn retry_all_replays_failed_items() {
    let transport =
        ScriptedTransport::new(Scripted::Status(400, Some(r#"{"bad": true}"#.into())));
    let (outbox, _actions) = recording_outbox(config(), Arc::clone(&transport));
    Arc::clone(&outbox).start();

    let item = outbox
        .save(json!({"name": "a"}), item_options())
        .await
        .unwrap()
        .expect("save should queue");
    let failed = outbox.wait_for_item(item.id).await.unwrap();
    assert!(failed.error.is_some());

    // The server accepts it the second time around.
    transport.push(Scripted::Ok(Some(json!({"id": 1}))));
    outbox.retry_all().await;

    let item = outbox.load_item(item.id).await.unwrap();
    assert!(item.synced);
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn pause_holds_work_until_resume() {
    let transport = ScriptedTransport::new(Scripted::Ok(Some(json!({"id": 1}))));
    let (outbox, _actions) = recording_outbox(config(), Arc::clone(&transport));

    outbox.pause().await;
    let item = outbox
        .save(json!({"name": "held"}), item_options())
        .await
        .unwrap()
        .expect("save should queue");
    outbox.process_pending().await;
    assert_eq!(transport.request_count(), 0);

    outbox.resume().await;
    outbox.process_pending().await;
    assert_eq!(transport.request_count(), 1);
    assert!(outbox.load_item(item.id).await.unwrap().synced);
}

#[tokio::test]
async fn validation_rejects_before_queueing() {
    let transport = ScriptedTransport::new(Scripted::Ok(None));
    let outbox = Outbox::new(config(), Arc::new(MemoryStore::new()), transport)
        .with_validate(|data, _options| data.get("name").is_some());

    let rejected = outbox.save(json!({}), item_options()).await.unwrap();
    assert!(rejected.is_none());
    assert!(outbox.load_items().await.is_empty());

    let accepted = outbox
        .save(json!({"name": "ok"}), item_options())
        .await
        .unwrap();
    assert!(accepted.is_some());
}

#[tokio::test]
async fn same_id_resave_replaces_after_failure() {
    let transport =
        ScriptedTransport::new(Scripted::Status(400, Some(r#"{"name": ["required"]}"#.into())));
    let (outbox, _actions) = recording_outbox(config(), Arc::clone(&transport));

    let item = outbox
        .save(json!({}), item_options())
        .await
        .unwrap()
        .expect("save should queue");
    outbox.process_pending().await;
    assert!(outbox.load_item(item.id).await.unwrap().error.is_some());

    // Fix the form and resubmit under the same outbox id.
    transport.push(Scripted::Ok(Some(json!({"id": 1, "name": "fixed"}))));
    let mut options = item_options();
    options.id = Some(item.id);
    outbox
        .save(json!({"name": "fixed"}), options)
        .await
        .unwrap()
        .expect("resave should queue");
    outbox.process_pending().await;

    let items = outbox.load_items().await;
    assert_eq!(items.len(), 1);
    assert!(outbox.load_item(item.id).await.unwrap().synced);
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn on_sync_fires_for_settled_items() {
    let transport = ScriptedTransport::new(Scripted::Ok(Some(json!({"id": 1}))));
    let synced: Arc<StdMutex<Vec<u64>>> = Arc::new(StdMutex::new(Vec::new()));
    let log = Arc::clone(&synced);
    let outbox = Outbox::new(config(), Arc::new(MemoryStore::new()), transport)
        .with_on_sync(move |item| {
            if let Some(item) = item {
                log.lock().unwrap().push(item.id);
            }
        });

    outbox.save(json!({"name": "a"}), item_options()).await.unwrap();
    outbox.process_pending().await;
    assert_eq!(*synced.lock().unwrap(), vec![1]);
}

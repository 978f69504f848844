use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use outbox_storage::PayloadStore;
use outbox_transport::{Method, RequestBody, Transport, TransportRequest};
use serde_json::Value;
use tokio::sync::{oneshot, Mutex, Notify, RwLock};
use tracing::{debug, info, warn};

use crate::action::{ActionDescriptor, ActionLabel, ActionScope, ActionType};
use crate::batch::{self, BatchJob};
use crate::config::OutboxConfig;
use crate::effect;
use crate::error::{OutboxError, OutboxResult};
use crate::form;
use crate::item::{ActionMeta, Effect, OutboxItem, QueuedAction, SyncError, MISSING_DATA_LABEL};
use crate::options::{ApplyState, SaveOptions, StorageMode};
use crate::retry::RetryDecision;
use crate::state::{OutboxState, QueueEvent, ResultAction};

type ValidateFn = dyn Fn(&Value, &SaveOptions) -> bool + Send + Sync;
type OnSyncFn = dyn Fn(Option<OutboxItem>) + Send + Sync;
type OnActionFn = dyn Fn(&ActionType, Option<&Value>) + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum WaitKey {
    Item(u64),
    All,
}

enum Work {
    Single(QueuedAction),
    Batch(BatchJob),
}

fn payload_key(id: u64) -> String {
    format!("outbox_{id}")
}

/// The outbox controller: owns the queue, applies the save decision table,
/// and drains pending items through the transport one attempt at a time.
pub struct Outbox {
    config: OutboxConfig,
    store: Arc<dyn PayloadStore>,
    transport: Arc<dyn Transport>,
    state: Mutex<OutboxState>,
    /// Temporary payloads, keyed by outbox id. Never persisted.
    memory_items: Mutex<HashMap<u64, Value>>,
    waiting: Mutex<HashMap<WaitKey, Vec<oneshot::Sender<Option<OutboxItem>>>>>,
    /// Pending-id snapshot from the last state change, diffed to find items
    /// that just settled.
    last_pending: Mutex<HashSet<u64>>,
    csrf_token: RwLock<Option<String>>,
    validate: Option<Box<ValidateFn>>,
    on_sync: Option<Box<OnSyncFn>>,
    on_action: Option<Box<OnActionFn>>,
    notify: Notify,
    started: AtomicBool,
}

impl Outbox {
    pub fn new(
        config: OutboxConfig,
        store: Arc<dyn PayloadStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            store,
            transport,
            state: Mutex::new(OutboxState::default()),
            memory_items: Mutex::new(HashMap::new()),
            waiting: Mutex::new(HashMap::new()),
            last_pending: Mutex::new(HashSet::new()),
            csrf_token: RwLock::new(None),
            validate: None,
            on_sync: None,
            on_action: None,
            notify: Notify::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Reject saves before they enter the queue. Default accepts everything.
    pub fn with_validate(
        mut self,
        validate: impl Fn(&Value, &SaveOptions) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.validate = Some(Box::new(validate));
        self
    }

    /// Called with the finalized item whenever one settles, waiters or not.
    pub fn with_on_sync(
        mut self,
        on_sync: impl Fn(Option<OutboxItem>) + Send + Sync + 'static,
    ) -> Self {
        self.on_sync = Some(Box::new(on_sync));
        self
    }

    /// Called for every dispatched lifecycle action (submits, optimistic
    /// updates, commits, rollbacks), in order. This is the seam a host hangs
    /// its model-state handling on.
    pub fn with_on_action(
        mut self,
        on_action: impl Fn(&ActionType, Option<&Value>) + Send + Sync + 'static,
    ) -> Self {
        self.on_action = Some(Box::new(on_action));
        self
    }

    pub fn config(&self) -> &OutboxConfig {
        &self.config
    }

    pub async fn set_csrf_token(&self, token: Option<String>) {
        *self.csrf_token.write().await = token;
    }

    /// Startup pass: optionally drop synced and plain-temporary leftovers,
    /// then sweep orphaned payloads.
    pub async fn init(&self) -> OutboxResult<()> {
        if self.config.clean_outbox {
            let mut state = self.state.lock().await;
            state.outbox.retain(|action| {
                !action.is_synced()
                    && (action.effect.options.storage != StorageMode::Temporary
                        || action.effect.options.desired_storage.is_some())
            });
        }
        self.cleanup_item_data().await?;
        let pending = self.state.lock().await.pending_ids();
        *self.last_pending.lock().await = pending;
        Ok(())
    }

    /// Spawn the drain worker. Safe to call once; later calls are ignored.
    pub fn start(self: Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Outbox drain worker already started");
            return;
        }
        let outbox = self;
        tokio::spawn(async move {
            info!("Outbox drain worker started");
            loop {
                outbox.process_pending().await;
                let next_due = {
                    let state = outbox.state.lock().await;
                    if state.paused {
                        None
                    } else {
                        state.next_due()
                    }
                };
                match next_due {
                    Some(at) => {
                        let wait = (at - Utc::now())
                            .to_std()
                            .unwrap_or(std::time::Duration::ZERO);
                        tokio::select! {
                            _ = outbox.notify.notified() => {}
                            _ = tokio::time::sleep(wait) => {}
                        }
                    }
                    None => outbox.notify.notified().await,
                }
            }
        });
    }

    // ---- save ----

    /// Queue (and eventually sync) one mutation. Returns the queued item, or
    /// `None` when validation rejects the save or it is local-only.
    pub async fn save(
        &self,
        data: Value,
        mut options: SaveOptions,
    ) -> OutboxResult<Option<OutboxItem>> {
        if options.storage == StorageMode::Temporary {
            options.once = true;
        }
        if let Some(validate) = &self.validate {
            if !validate(&data, &options) {
                debug!("Save rejected by validator");
                return Ok(None);
            }
        }

        let mut state = self.state.lock().await;
        let provisional = match options.id {
            Some(id) => id,
            None => state.last_transaction + 1,
        };
        let (data, options) = self.apply_storage_policy(provisional, data, options).await?;

        let current_id = data
            .as_ref()
            .and_then(|data| data.get("id"))
            .cloned()
            .or_else(|| current_id_from_url(&options));
        let plan = plan_action(&self.config, &options, current_id, data.as_ref(), provisional);

        self.emit_action(&plan.action_type, plan.payload.as_ref());
        if plan.commit.is_none() {
            // Local-only or no lifecycle to sync: nothing enters the queue.
            return Ok(None);
        }

        let queued = QueuedAction {
            action_type: plan.action_type,
            payload: plan.payload,
            effect: Effect { data, options },
            commit: plan.commit,
            rollback: plan.rollback,
            meta: ActionMeta::default(),
        };
        let id = state.enqueue(queued);
        drop(state);

        self.after_state_change().await;
        self.notify.notify_one();
        Ok(self.load_item(id).await)
    }

    /// Move the payload out of line per the storage mode. A persistent write
    /// failure falls back to temporary and records the intent.
    async fn apply_storage_policy(
        &self,
        outbox_id: u64,
        data: Value,
        mut options: SaveOptions,
    ) -> OutboxResult<(Option<Value>, SaveOptions)> {
        match options.storage {
            StorageMode::Inline => Ok((Some(data), options)),
            StorageMode::Temporary => {
                self.memory_items.lock().await.insert(outbox_id, data);
                Ok((None, options))
            }
            StorageMode::Persistent => {
                match self.store.set_item(&payload_key(outbox_id), &data).await {
                    Ok(()) => Ok((None, options)),
                    Err(e) => {
                        warn!(
                            outbox_id,
                            error = %e,
                            "Payload store write failed; keeping payload in memory"
                        );
                        options.desired_storage = Some(StorageMode::Persistent);
                        options.storage = StorageMode::Temporary;
                        self.memory_items.lock().await.insert(outbox_id, data);
                        Ok((None, options))
                    }
                }
            }
        }
    }

    // ---- drain ----

    /// Send everything currently due, one attempt at a time, until the queue
    /// has no due work. The worker calls this; hosts and tests may too.
    pub async fn process_pending(&self) {
        loop {
            let Some(work) = self.next_work().await else {
                break;
            };
            match work {
                Work::Single(action) => self.send_single(action).await,
                Work::Batch(job) => self.send_batch(job).await,
            }
        }
    }

    async fn next_work(&self) -> Option<Work> {
        let state = self.state.lock().await;
        if state.paused {
            return None;
        }
        let now = Utc::now();
        let pending = state.pending(now);
        if pending.is_empty() {
            return None;
        }

        if self.config.batch_service.is_some() && pending.len() >= self.config.batch_size_min {
            let slice: Vec<&QueuedAction> = pending
                .iter()
                .take(self.config.batch_size_max)
                .copied()
                .collect();
            let csrf = self.csrf_token.read().await.clone();
            let memory = self.memory_items.lock().await;
            if let Some(job) = batch::build_batch(&self.config, csrf.as_deref(), &slice, &memory) {
                return Some(Work::Batch(job));
            }
            // Fall back to sending the first item on its own.
        }
        pending.into_iter().next().cloned().map(Work::Single)
    }

    async fn send_single(&self, action: QueuedAction) {
        let id = action.meta.outbox_id;
        let options = &action.effect.options;
        let method = options.method.unwrap_or(self.config.sync_method);
        let rollback_type = action
            .rollback
            .as_ref()
            .map(|r| r.action_type.clone())
            .unwrap_or_else(|| action.action_type.with_label(ActionLabel::Error));

        let (data, missing) = self.load_action_data(&action).await;
        if missing && !method.is_delete() {
            warn!(outbox_id = id, "Payload no longer available; rolling item back");
            self.settle(ResultAction::rolled_back(
                id,
                rollback_type,
                SyncError::from_text(MISSING_DATA_LABEL),
            ))
            .await;
            return;
        }
        let data = data.unwrap_or_else(|| Value::Object(Default::default()));

        let csrf = self.csrf_token.read().await.clone();
        let result = effect::execute(
            self.transport.as_ref(),
            &self.config,
            csrf.as_deref(),
            options,
            action.payload.as_ref(),
            &data,
        )
        .await;

        match result {
            Ok(payload) => {
                let commit_type = action
                    .commit
                    .as_ref()
                    .map(|c| c.action_type.clone())
                    .unwrap_or_else(|| action.action_type.with_label(ActionLabel::Success));
                self.settle(ResultAction::committed(id, commit_type, payload))
                    .await;
            }
            Err(OutboxError::Transport(err)) => {
                let error = SyncError::from_transport(&err);
                match self
                    .config
                    .retry
                    .decide(options.once, action.meta.retries, &error)
                {
                    RetryDecision::Discard => {
                        warn!(outbox_id = id, error = %error, "Rolling item back");
                        self.settle(ResultAction::rolled_back(id, rollback_type, error))
                            .await;
                    }
                    RetryDecision::RetryAfter(delay) => {
                        let next = Utc::now() + delay;
                        let mut state = self.state.lock().await;
                        if let Some(item) = state
                            .outbox
                            .iter_mut()
                            .find(|item| item.meta.outbox_id == id)
                        {
                            item.meta.retries += 1;
                            item.meta.next_attempt_at = Some(next);
                            debug!(
                                outbox_id = id,
                                retries = item.meta.retries,
                                delay_ms = delay.num_milliseconds(),
                                "Scheduling retry"
                            );
                        }
                    }
                }
            }
            Err(other) => {
                // Config and payload errors cannot heal on retry.
                warn!(outbox_id = id, error = %other, "Item unsendable; rolling back");
                self.settle(ResultAction::rolled_back(
                    id,
                    rollback_type,
                    SyncError::from_text(other.to_string()),
                ))
                .await;
            }
        }
    }

    async fn send_batch(&self, job: BatchJob) {
        let Some(batch_suffix) = self.config.batch_service.as_deref() else {
            return;
        };
        let outcome = match effect::build_url(&self.config, batch_suffix) {
            Err(e) => Err(SyncError::from_text(e.to_string())),
            Ok(url) => {
                let csrf = self.csrf_token.read().await.clone();
                let mut headers = Vec::new();
                if let Some(token) = &csrf {
                    headers.push(("X-CSRFToken".to_string(), token.clone()));
                }
                match serde_json::to_value(&job.entries) {
                    Err(e) => Err(SyncError::from_text(e.to_string())),
                    Ok(entries) => {
                        debug!(
                            batch_id = %job.batch_id,
                            size = job.members.len(),
                            "Sending batch"
                        );
                        self.transport
                            .send(TransportRequest {
                                url,
                                method: Method::Post,
                                headers,
                                body: RequestBody::Json(entries),
                            })
                            .await
                            .map_err(|e| SyncError::from_transport(&e))
                    }
                }
            }
        };

        let results = batch::process_batch_response(&job.members, outcome);
        {
            let mut state = self.state.lock().await;
            state.dequeue(QueueEvent::BatchResult(results.clone()));
        }
        for result in &results {
            self.emit_action(&result.action_type, result.payload.as_ref());
        }
        self.after_state_change().await;
    }

    async fn settle(&self, result: ResultAction) {
        self.emit_action(&result.action_type, result.payload.as_ref());
        {
            let mut state = self.state.lock().await;
            state.dequeue(QueueEvent::Settle(result));
        }
        self.after_state_change().await;
    }

    fn emit_action(&self, action_type: &ActionType, payload: Option<&Value>) {
        debug!(action = %action_type, "Dispatching action");
        if let Some(hook) = &self.on_action {
            hook(action_type, payload);
        }
    }

    /// Resolve waiters and fire `on_sync` for ids that just left the pending
    /// set; sweep payloads once the queue is empty.
    async fn after_state_change(&self) {
        let (pending, queue_empty) = {
            let state = self.state.lock().await;
            (state.pending_ids(), state.outbox.is_empty())
        };
        let newly_settled: Vec<u64> = {
            let mut last = self.last_pending.lock().await;
            let settled = last
                .iter()
                .filter(|id| !pending.contains(id))
                .copied()
                .collect();
            *last = pending.clone();
            settled
        };

        let mut to_resolve = Vec::new();
        {
            let mut waiting = self.waiting.lock().await;
            let keys: Vec<WaitKey> = waiting.keys().copied().collect();
            for key in keys {
                let done = match key {
                    WaitKey::Item(id) => !pending.contains(&id),
                    WaitKey::All => pending.is_empty(),
                };
                if done {
                    if let Some(senders) = waiting.remove(&key) {
                        let id = match key {
                            WaitKey::Item(id) => Some(id),
                            WaitKey::All => None,
                        };
                        to_resolve.push((id, senders));
                    }
                }
            }
        }
        for (id, senders) in to_resolve {
            let item = match id {
                Some(id) => self.load_item(id).await,
                None => None,
            };
            for sender in senders {
                let _ = sender.send(item.clone());
            }
        }

        if let Some(on_sync) = &self.on_sync {
            for id in newly_settled {
                on_sync(self.load_item(id).await);
            }
        }

        if queue_empty {
            if let Err(e) = self.cleanup_item_data().await {
                warn!(error = %e, "Payload cleanup failed");
            }
        }
    }

    // ---- waiting ----

    /// Resolves once `id` has no pending work (settled or removed), with the
    /// finalized item when it still exists.
    pub async fn wait_for_item(&self, id: u64) -> Option<OutboxItem> {
        let receiver = {
            let (sender, receiver) = oneshot::channel();
            self.waiting
                .lock()
                .await
                .entry(WaitKey::Item(id))
                .or_default()
                .push(sender);
            receiver
        };
        // Resolve immediately if the item is already settled or gone.
        self.after_state_change().await;
        receiver.await.unwrap_or(None)
    }

    /// Resolves once nothing in the queue is pending.
    pub async fn wait_for_all(&self) {
        let receiver = {
            let (sender, receiver) = oneshot::channel();
            self.waiting
                .lock()
                .await
                .entry(WaitKey::All)
                .or_default()
                .push(sender);
            receiver
        };
        self.after_state_change().await;
        let _ = receiver.await;
    }

    // ---- queue management ----

    pub async fn remove_item(&self, id: u64) {
        self.remove_items(&[id]).await;
    }

    pub async fn remove_items(&self, ids: &[u64]) {
        {
            let mut state = self.state.lock().await;
            state.dequeue(QueueEvent::Remove(ids.to_vec()));
        }
        {
            let mut memory = self.memory_items.lock().await;
            for id in ids {
                memory.remove(id);
            }
        }
        for id in ids {
            if let Err(e) = self.store.remove_item(&payload_key(*id)).await {
                warn!(outbox_id = *id, error = %e, "Payload removal failed");
            }
        }
        self.after_state_change().await;
        self.notify.notify_one();
    }

    pub async fn retry_item(&self, id: u64) {
        self.retry_items(&[id]).await;
    }

    /// Clear terminal state so the named items are attempted again.
    pub async fn retry_items(&self, ids: &[u64]) {
        {
            let mut state = self.state.lock().await;
            state.dequeue(QueueEvent::Retry(ids.to_vec()));
        }
        self.after_state_change().await;
        self.notify.notify_one();
    }

    /// Retry every unsynced item and wait for the queue to drain.
    pub async fn retry_all(&self) {
        let ids: Vec<u64> = self
            .unsynced_items(None)
            .await
            .iter()
            .map(|item| item.id)
            .collect();
        if ids.is_empty() {
            return;
        }
        self.retry_items(&ids).await;
        self.wait_for_all().await;
    }

    /// Stop dispatching network attempts. In-flight attempts finish.
    pub async fn pause(&self) {
        self.state.lock().await.paused = true;
        debug!("Outbox paused");
    }

    pub async fn resume(&self) {
        self.state.lock().await.paused = false;
        debug!("Outbox resumed");
        self.notify.notify_one();
    }

    /// Drop everything: queue, in-memory payloads, stored payloads.
    pub async fn empty(&self) -> OutboxResult<()> {
        {
            let mut state = self.state.lock().await;
            state.outbox.clear();
        }
        self.memory_items.lock().await.clear();
        self.cleanup_item_data().await?;
        self.after_state_change().await;
        Ok(())
    }

    /// Remove stored and in-memory payloads that no queued item references.
    async fn cleanup_item_data(&self) -> OutboxResult<()> {
        let (ids, valid_keys): (HashSet<u64>, HashSet<String>) = {
            let state = self.state.lock().await;
            let ids: HashSet<u64> = state
                .outbox
                .iter()
                .map(|action| action.meta.outbox_id)
                .collect();
            let keys = ids.iter().map(|id| payload_key(*id)).collect();
            (ids, keys)
        };
        self.memory_items
            .lock()
            .await
            .retain(|id, _| ids.contains(id));
        for key in self.store.keys().await? {
            if key.starts_with("outbox_") && !valid_keys.contains(&key) {
                debug!(key = %key, "Removing orphaned payload");
                self.store.remove_item(&key).await?;
            }
        }
        Ok(())
    }

    // ---- introspection ----

    async fn load_action_data(&self, action: &QueuedAction) -> (Option<Value>, bool) {
        let id = action.meta.outbox_id;
        match action.effect.options.storage {
            StorageMode::Inline => (action.effect.data.clone(), false),
            StorageMode::Temporary => match self.memory_items.lock().await.get(&id) {
                Some(data) => (Some(data.clone()), false),
                None => (None, true),
            },
            StorageMode::Persistent => match self.store.get_item(&payload_key(id)).await {
                Ok(Some(data)) => (Some(data), false),
                Ok(None) => (None, true),
                Err(e) => {
                    warn!(outbox_id = id, error = %e, "Payload read failed");
                    (None, true)
                }
            },
        }
    }

    async fn item_with_data(&self, action: &QueuedAction) -> OutboxItem {
        let mut item = action.to_item();
        let (data, missing) = self.load_action_data(action).await;
        if let Some(data) = data {
            item.data = Some(form::parse_json_form(&data));
        } else if missing {
            item.label = MISSING_DATA_LABEL.to_string();
            item.missing = true;
        }
        item
    }

    /// All queued items, newest first, without payload data attached.
    pub async fn load_items(&self) -> Vec<OutboxItem> {
        let mut items: Vec<OutboxItem> = {
            let state = self.state.lock().await;
            state.outbox.iter().map(QueuedAction::to_item).collect()
        };
        items.sort_by(|a, b| b.id.cmp(&a.id));
        items
    }

    /// All queued items, newest first, with payload data loaded and
    /// bracket-names expanded.
    pub async fn load_items_with_data(&self) -> Vec<OutboxItem> {
        let actions: Vec<QueuedAction> = { self.state.lock().await.outbox.clone() };
        let mut items = Vec::with_capacity(actions.len());
        for action in &actions {
            items.push(self.item_with_data(action).await);
        }
        items.sort_by(|a, b| b.id.cmp(&a.id));
        items
    }

    /// One item, with payload data, or `None` if it is not queued.
    pub async fn load_item(&self, id: u64) -> Option<OutboxItem> {
        let action = {
            let state = self.state.lock().await;
            state
                .outbox
                .iter()
                .find(|action| action.meta.outbox_id == id)
                .cloned()
        };
        match action {
            Some(action) => Some(self.item_with_data(&action).await),
            None => None,
        }
    }

    fn matching_items(
        state: &OutboxState,
        model: Option<&str>,
        pending_only: bool,
    ) -> Vec<OutboxItem> {
        let mut items: Vec<OutboxItem> = state
            .outbox
            .iter()
            .filter(|action| action.is_unsynced())
            .filter(|action| !pending_only || action.meta.error.is_none())
            .filter(|action| match model {
                Some(name) => action
                    .effect
                    .options
                    .model
                    .as_ref()
                    .map(|m| m.name == name)
                    .unwrap_or(false),
                None => true,
            })
            .map(QueuedAction::to_item)
            .collect();
        items.sort_by(|a, b| b.id.cmp(&a.id));
        items
    }

    /// Unsynced items (optionally for one model), newest first.
    pub async fn unsynced_items(&self, model: Option<&str>) -> Vec<OutboxItem> {
        let state = self.state.lock().await;
        Self::matching_items(&state, model, false)
    }

    /// Unsynced items without a recorded error, newest first.
    pub async fn pending_items(&self, model: Option<&str>) -> Vec<OutboxItem> {
        let state = self.state.lock().await;
        Self::matching_items(&state, model, true)
    }

    /// Count of unsynced items, optionally for one model.
    pub async fn unsynced(&self, model: Option<&str>) -> usize {
        self.unsynced_items(model).await.len()
    }

    // ---- persistence ----

    pub async fn snapshot(&self) -> OutboxState {
        self.state.lock().await.clone()
    }

    /// Replace the queue with a previously-snapshotted state.
    pub async fn restore(&self, state: OutboxState) {
        let pending = state.pending_ids();
        *self.state.lock().await = state;
        *self.last_pending.lock().await = pending;
        self.notify.notify_one();
    }
}

struct SavePlan {
    action_type: ActionType,
    payload: Option<Value>,
    commit: Option<ActionDescriptor>,
    rollback: Option<ActionDescriptor>,
}

/// The record id a save targets: explicit `data.id`, else parsed from a
/// `<model.url>/<id>` url suffix (numeric ids become numbers).
fn current_id_from_url(options: &SaveOptions) -> Option<Value> {
    let model = options.model.as_ref()?;
    let model_url = model.url.as_deref()?;
    let url = options.url.as_deref()?;
    let rest = url.strip_prefix(&format!("{model_url}/"))?;
    if rest.is_empty() {
        return None;
    }
    match rest.parse::<i64>() {
        Ok(n) => Some(Value::from(n)),
        Err(_) => Some(Value::String(rest.to_string())),
    }
}

/// The optimistic payload for immediate/local application: expanded form
/// data stamped with the real id, or an `outbox-<n>` placeholder when the
/// record does not exist yet and the save will sync.
fn local_payload(data: Option<&Value>, current_id: Option<&Value>, placeholder: Option<u64>) -> Value {
    let mut payload = match data {
        Some(data) => form::parse_json_form(data),
        None => Value::Object(Default::default()),
    };
    if !payload.is_object() {
        payload = Value::Object(Default::default());
    }
    if let Some(object) = payload.as_object_mut() {
        if !object.contains_key("id") {
            if let Some(id) = current_id {
                object.insert("id".to_string(), id.clone());
            } else if let Some(n) = placeholder {
                object.insert("id".to_string(), Value::String(format!("outbox-{n}")));
            }
        }
    }
    payload
}

/// The save decision table: apply-state crossed with DELETE-or-not for list
/// models; plain submit triples otherwise.
fn plan_action(
    config: &OutboxConfig,
    options: &SaveOptions,
    current_id: Option<Value>,
    data: Option<&Value>,
    outbox_id: u64,
) -> SavePlan {
    let method = options.method.unwrap_or(config.sync_method);
    let scope = match &options.model {
        Some(model) if model.list => ActionScope::Model(model.name.clone()),
        Some(model) => ActionScope::Named(model.name.clone()),
        None => ActionScope::Form,
    };
    let at = |label: ActionLabel| ActionType::new(scope.clone(), label);
    let descriptor =
        |label: ActionLabel| Some(ActionDescriptor::new(at(label), current_id.clone()));

    if !matches!(scope, ActionScope::Model(_)) {
        return SavePlan {
            action_type: at(ActionLabel::Submit),
            payload: None,
            commit: descriptor(ActionLabel::Success),
            rollback: descriptor(ActionLabel::Error),
        };
    }

    let apply = options.apply_state.unwrap_or(config.apply_state);
    if method.is_delete() && current_id.is_some() {
        match apply {
            ApplyState::OnSuccess => SavePlan {
                action_type: at(ActionLabel::DeleteSubmit),
                payload: current_id.clone(),
                commit: descriptor(ActionLabel::Delete),
                rollback: descriptor(ActionLabel::DeleteError),
            },
            ApplyState::Immediate => SavePlan {
                action_type: at(ActionLabel::Delete),
                payload: current_id.clone(),
                commit: descriptor(ActionLabel::DeleteSuccess),
                rollback: descriptor(ActionLabel::DeleteError),
            },
            ApplyState::LocalOnly => SavePlan {
                action_type: at(ActionLabel::Delete),
                payload: current_id.clone(),
                commit: None,
                rollback: None,
            },
        }
    } else {
        match apply {
            ApplyState::OnSuccess => SavePlan {
                action_type: at(ActionLabel::Submit),
                payload: None,
                commit: descriptor(ActionLabel::Update),
                rollback: descriptor(ActionLabel::Error),
            },
            ApplyState::Immediate => SavePlan {
                action_type: at(ActionLabel::Update),
                payload: Some(local_payload(data, current_id.as_ref(), Some(outbox_id))),
                commit: descriptor(ActionLabel::Success),
                rollback: descriptor(ActionLabel::Error),
            },
            ApplyState::LocalOnly => SavePlan {
                action_type: at(ActionLabel::Update),
                payload: Some(local_payload(data, current_id.as_ref(), None)),
                commit: None,
                rollback: None,
            },
        }
    }
}

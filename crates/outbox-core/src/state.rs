use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::action::{ActionLabel, ActionType};
use crate::item::{QueuedAction, SyncError};
use crate::retry::RetryPolicy;

/// A terminal outcome for one item, routed through its stored commit or
/// rollback descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultAction {
    pub outbox_id: u64,
    pub action_type: ActionType,
    pub success: bool,
    pub payload: Option<Value>,
    pub error: Option<SyncError>,
}

impl ResultAction {
    pub fn committed(outbox_id: u64, action_type: ActionType, payload: Option<Value>) -> Self {
        Self {
            outbox_id,
            action_type,
            success: true,
            payload,
            error: None,
        }
    }

    pub fn rolled_back(outbox_id: u64, action_type: ActionType, error: SyncError) -> Self {
        Self {
            outbox_id,
            action_type,
            success: false,
            payload: None,
            error: Some(error),
        }
    }
}

/// Everything that can change the queue after enqueue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// Drop the named items entirely.
    Remove(Vec<u64>),
    /// Mark the named items pending again for another attempt.
    Retry(Vec<u64>),
    /// Record a commit or rollback for one item.
    Settle(ResultAction),
    /// Record outcomes for every member of a batch, in order.
    BatchResult(Vec<ResultAction>),
}

/// The persisted queue: items plus the transaction counter that allocates
/// outbox ids. `paused` is runtime-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboxState {
    #[serde(default)]
    pub outbox: Vec<QueuedAction>,
    #[serde(default)]
    pub last_transaction: u64,
    #[serde(skip)]
    pub paused: bool,
}

fn parent_ref(value: &Value) -> Option<u64> {
    value
        .as_str()
        .and_then(|s| s.strip_prefix("outbox-"))
        .and_then(|rest| rest.parse::<u64>().ok())
}

/// Outbox ids referenced by `outbox-<n>` placeholders in top-level fields.
pub fn scan_parents(data: Option<&Value>) -> Vec<u64> {
    let Some(object) = data.and_then(Value::as_object) else {
        return Vec::new();
    };
    object.values().filter_map(parent_ref).collect()
}

impl OutboxState {
    /// Add an item to the queue. A caller-supplied id replaces the existing
    /// item with that id after copying `preserve`d fields the new payload
    /// omits; otherwise a fresh id is allocated. Missing commit/rollback
    /// descriptors default to the action's own SUCCESS/ERROR stages.
    pub fn enqueue(&mut self, mut action: QueuedAction) -> u64 {
        self.last_transaction += 1;
        let outbox_id = match action.effect.options.id {
            Some(id) => {
                if let Some(pos) = self
                    .outbox
                    .iter()
                    .position(|existing| existing.meta.outbox_id == id)
                {
                    let previous = self.outbox.remove(pos);
                    copy_preserved(&mut action, &previous);
                }
                id
            }
            None => {
                let id = self.last_transaction;
                action.effect.options.id = Some(id);
                id
            }
        };
        action.meta.outbox_id = outbox_id;

        if action.commit.is_none() {
            action.commit = Some(crate::action::ActionDescriptor::new(
                action.action_type.with_label(ActionLabel::Success),
                None,
            ));
        }
        if action.rollback.is_none() {
            action.rollback = Some(crate::action::ActionDescriptor::new(
                action.action_type.with_label(ActionLabel::Error),
                None,
            ));
        }

        action.meta.parents = scan_parents(action.effect.data.as_ref());
        debug!(
            outbox_id,
            action = %action.action_type,
            parents = action.meta.parents.len(),
            "Enqueued outbox item"
        );
        self.outbox.push(action);
        outbox_id
    }

    pub fn dequeue(&mut self, event: QueueEvent) {
        match event {
            QueueEvent::Remove(ids) => {
                self.outbox
                    .retain(|action| !ids.contains(&action.meta.outbox_id));
            }
            QueueEvent::Retry(ids) => {
                for action in &mut self.outbox {
                    if ids.contains(&action.meta.outbox_id) {
                        action.meta.completed = false;
                        action.meta.success = None;
                        action.meta.retries = 0;
                        action.meta.next_attempt_at = None;
                    }
                }
            }
            QueueEvent::Settle(result) => self.settle(result),
            QueueEvent::BatchResult(results) => {
                for result in results {
                    self.settle(result);
                }
            }
        }
    }

    fn settle(&mut self, result: ResultAction) {
        let Some(action) = self
            .outbox
            .iter_mut()
            .find(|action| action.meta.outbox_id == result.outbox_id)
        else {
            debug!(outbox_id = result.outbox_id, "Settle for unknown item");
            return;
        };
        action.meta.completed = true;
        action.meta.success = Some(result.success);
        action.meta.result = result.payload.clone();
        action.meta.error = result.error;
        debug!(
            outbox_id = result.outbox_id,
            action = %result.action_type,
            success = result.success,
            "Settled outbox item"
        );
        if result.success {
            let server_id = result
                .payload
                .as_ref()
                .and_then(|payload| payload.get("id"))
                .cloned();
            self.resolve_children(result.outbox_id, server_id);
        }
    }

    /// Rewrite `outbox-<parent>` placeholders in children with the committed
    /// server id and drop the satisfied dependency edge.
    fn resolve_children(&mut self, parent_id: u64, server_id: Option<Value>) {
        let placeholder = format!("outbox-{parent_id}");
        for action in &mut self.outbox {
            if !action.meta.parents.contains(&parent_id) {
                continue;
            }
            if let Some(object) = action.effect.data.as_mut().and_then(Value::as_object_mut) {
                for value in object.values_mut() {
                    if value.as_str() == Some(placeholder.as_str()) {
                        *value = server_id.clone().unwrap_or(Value::Null);
                    }
                }
            }
            action.meta.parents.retain(|id| *id != parent_id);
            debug!(
                outbox_id = action.meta.outbox_id,
                parent_id, "Resolved parent reference"
            );
        }
    }

    /// Items eligible for a network attempt right now: not completed, no
    /// unresolved parents, and past any backoff due time.
    pub fn pending(&self, now: DateTime<Utc>) -> Vec<&QueuedAction> {
        self.outbox
            .iter()
            .filter(|action| {
                !action.meta.completed
                    && action.meta.parents.is_empty()
                    && RetryPolicy::is_due(action.meta.next_attempt_at, now)
            })
            .collect()
    }

    pub fn peek(&self, now: DateTime<Utc>) -> Option<&QueuedAction> {
        self.pending(now).into_iter().next()
    }

    /// Ids with work still outstanding (not yet settled), due or not.
    pub fn pending_ids(&self) -> HashSet<u64> {
        self.outbox
            .iter()
            .filter(|action| !action.meta.completed)
            .map(|action| action.meta.outbox_id)
            .collect()
    }

    /// Earliest backoff deadline among otherwise-eligible items.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.outbox
            .iter()
            .filter(|action| !action.meta.completed && action.meta.parents.is_empty())
            .filter_map(|action| action.meta.next_attempt_at)
            .min()
    }
}

fn copy_preserved(action: &mut QueuedAction, previous: &QueuedAction) {
    let preserve = action.effect.options.preserve.clone();
    if preserve.is_empty() {
        return;
    }
    let Some(old_data) = previous.effect.data.as_ref().and_then(Value::as_object) else {
        return;
    };
    let Some(new_data) = action.effect.data.as_mut().and_then(Value::as_object_mut) else {
        return;
    };
    for field in &preserve {
        if !new_data.contains_key(field) {
            if let Some(value) = old_data.get(field) {
                new_data.insert(field.clone(), value.clone());
            }
        }
    }
}

use chrono::{DateTime, Utc};
use outbox_transport::TransportError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::{ActionDescriptor, ActionType};
use crate::options::{SaveOptions, StorageMode};

/// Label shown for an item whose out-of-line payload can no longer be loaded.
pub const MISSING_DATA_LABEL: &str = "[Form Data Missing]";

/// The narrowed, serializable record of a failed sync attempt. Live error
/// objects never enter persisted state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl SyncError {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Narrow a transport failure: JSON error bodies are kept structured,
    /// anything else becomes text.
    pub fn from_transport(err: &TransportError) -> Self {
        match err {
            TransportError::Status { status, body } => match body {
                Some(body) => match serde_json::from_str::<Value>(body) {
                    Ok(json) => Self {
                        json: Some(json),
                        text: None,
                        status: Some(*status),
                    },
                    Err(_) => Self {
                        json: None,
                        text: Some(body.clone()),
                        status: Some(*status),
                    },
                },
                None => Self {
                    json: None,
                    text: None,
                    status: Some(*status),
                },
            },
            other => Self {
                json: None,
                text: Some(other.to_string()),
                status: other.status(),
            },
        }
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(json) = &self.json {
            return write!(f, "{json}");
        }
        if let Some(text) = &self.text {
            return f.write_str(text);
        }
        match self.status {
            Some(status) => write!(f, "HTTP {status}"),
            None => f.write_str("sync error"),
        }
    }
}

/// What to send: the (possibly out-of-line) payload plus the options that
/// shape the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub options: SaveOptions,
}

/// Queue bookkeeping for one item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionMeta {
    pub outbox_id: u64,

    /// Outbox ids this item's payload references via `outbox-<n>`
    /// placeholders. Non-empty means the item is not yet sendable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<u64>,

    /// A network attempt reached a terminal outcome (commit or rollback).
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SyncError>,

    #[serde(default)]
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

/// One queued mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub effect: Effect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<ActionDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<ActionDescriptor>,
    #[serde(default)]
    pub meta: ActionMeta,
}

impl QueuedAction {
    pub fn is_pending(&self) -> bool {
        !self.meta.completed
    }

    pub fn is_synced(&self) -> bool {
        self.meta.success == Some(true)
    }

    /// The introspection view, without payload data attached (the controller
    /// loads data separately since it may live out of line).
    pub fn to_item(&self) -> OutboxItem {
        let id = self.meta.outbox_id;
        let mut options = self.effect.options.clone();
        options.id = None;
        let label = options
            .label
            .clone()
            .unwrap_or_else(|| format!("Unsynced Item #{id}"));
        let deleted_id = match options.method {
            Some(method) if method.is_delete() => self.payload.clone(),
            _ => None,
        };
        OutboxItem {
            id,
            label,
            data: None,
            synced: self.is_synced(),
            parents: self.meta.parents.clone(),
            result: self.meta.result.clone(),
            error: self.meta.error.clone(),
            deleted_id,
            missing: false,
            options,
        }
    }

    /// Whether the item shows up in unsynced listings: everything unsynced
    /// except plain temporary items (which vanish with the process anyway),
    /// unless temporary was a fallback from persistent.
    pub fn is_unsynced(&self) -> bool {
        if self.is_synced() {
            return false;
        }
        self.effect.options.storage != StorageMode::Temporary
            || self.effect.options.desired_storage.is_some()
    }
}

/// Host-facing view of one queued item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxItem {
    pub id: u64,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub synced: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SyncError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_id: Option<Value>,
    #[serde(default)]
    pub missing: bool,
    pub options: SaveOptions,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionLabel, ActionScope};
    use outbox_transport::Method;
    use serde_json::json;

    fn queued(id: u64) -> QueuedAction {
        QueuedAction {
            action_type: ActionType::new(ActionScope::Model("item".into()), ActionLabel::Submit),
            payload: None,
            effect: Effect {
                data: Some(json!({"name": "a"})),
                options: SaveOptions {
                    id: Some(id),
                    url: Some("items".into()),
                    ..Default::default()
                },
            },
            commit: None,
            rollback: None,
            meta: ActionMeta {
                outbox_id: id,
                ..Default::default()
            },
        }
    }

    #[test]
    fn default_label_names_the_id() {
        let item = queued(4).to_item();
        assert_eq!(item.label, "Unsynced Item #4");
        assert_eq!(item.options.id, None);
        assert!(!item.synced);
    }

    #[test]
    fn delete_items_surface_deleted_id() {
        let mut action = queued(2);
        action.effect.options.method = Some(Method::Delete);
        action.payload = Some(json!(123));
        assert_eq!(action.to_item().deleted_id, Some(json!(123)));
    }

    #[test]
    fn temporary_items_hidden_unless_fallback() {
        let mut action = queued(1);
        action.effect.options.storage = StorageMode::Temporary;
        assert!(!action.is_unsynced());

        action.effect.options.desired_storage = Some(StorageMode::Persistent);
        assert!(action.is_unsynced());
    }

    #[test]
    fn transport_status_errors_keep_json_bodies() {
        let err = TransportError::Status {
            status: 400,
            body: Some(r#"{"name": ["required"]}"#.into()),
        };
        let sync = SyncError::from_transport(&err);
        assert_eq!(sync.json, Some(json!({"name": ["required"]})));
        assert_eq!(sync.status, Some(400));

        let err = TransportError::Status {
            status: 500,
            body: Some("server on fire".into()),
        };
        let sync = SyncError::from_transport(&err);
        assert_eq!(sync.text.as_deref(), Some("server on fire"));
        assert_eq!(sync.json, None);
    }
}

use outbox_transport::Method;
use serde::{Deserialize, Serialize};

/// When the local model state should reflect a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApplyState {
    /// Update the model only after the server confirms the change.
    #[default]
    OnSuccess,
    /// Update the model optimistically, before the network attempt.
    Immediate,
    /// Update the model and never sync the change to the server.
    LocalOnly,
}

/// Where a queued item's payload lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Payload travels inside the queued action itself.
    #[default]
    Inline,
    /// Payload is held only in the controller's in-memory map; implies
    /// `once`, so the item is never retried after a failure.
    Temporary,
    /// Payload is spilled to the payload store under `outbox_<id>`.
    Persistent,
}

/// The model a save targets. `list` models get the full submit/update/delete
/// lifecycle; non-list models get a plain submit/success/error triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConf {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub list: bool,
}

/// Per-save options. Persisted with the queued item so replays behave
/// identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOptions {
    /// Existing outbox id to update in place (same-id enqueue replaces).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,

    /// URL suffix joined onto the configured service root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConf>,

    #[serde(default)]
    pub storage: StorageMode,

    /// Give up after the first failed attempt. Forced on by
    /// [`StorageMode::Temporary`].
    #[serde(default)]
    pub once: bool,

    /// Fields copied forward from the replaced item when a same-id save
    /// omits them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preserve: Vec<String>,

    /// Serialize the body as JSON instead of a multipart form.
    #[serde(default)]
    pub json: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_state: Option<ApplyState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Set when a persistent write failed and the payload fell back to
    /// temporary storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_storage: Option<StorageMode>,
}

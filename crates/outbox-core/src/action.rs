use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle stage of a queued mutation. Closed set: completion routing is a
/// pattern match on the stored descriptor, never string parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionLabel {
    Submit,
    Update,
    Success,
    Error,
    Delete,
    DeleteSubmit,
    DeleteSuccess,
    DeleteError,
}

impl ActionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionLabel::Submit => "SUBMIT",
            ActionLabel::Update => "UPDATE",
            ActionLabel::Success => "SUCCESS",
            ActionLabel::Error => "ERROR",
            ActionLabel::Delete => "DELETE",
            ActionLabel::DeleteSubmit => "DELETESUBMIT",
            ActionLabel::DeleteSuccess => "DELETESUCCESS",
            ActionLabel::DeleteError => "DELETEERROR",
        }
    }
}

/// What a lifecycle action is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionScope {
    /// A registered list model (full optimistic lifecycle).
    Model(String),
    /// A named endpoint without list semantics.
    Named(String),
    /// A bare form submission.
    Form,
    /// The aggregated batch endpoint.
    Batch,
}

/// A fully-qualified lifecycle action tag, e.g. the `ITEM` model's `SUBMIT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionType {
    pub scope: ActionScope,
    pub label: ActionLabel,
}

impl ActionType {
    pub fn new(scope: ActionScope, label: ActionLabel) -> Self {
        Self { scope, label }
    }

    /// Same scope, different lifecycle stage.
    pub fn with_label(&self, label: ActionLabel) -> Self {
        Self {
            scope: self.scope.clone(),
            label,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scope = match &self.scope {
            ActionScope::Model(name) | ActionScope::Named(name) => name.to_uppercase(),
            ActionScope::Form => "FORM".to_string(),
            ActionScope::Batch => "BATCH".to_string(),
        };
        write!(f, "{}_{}", scope, self.label.as_str())
    }
}

/// Stored commit or rollback routing for a queued item. `current_id` is the
/// record id the mutation targets, when one is known at save time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_id: Option<Value>,
}

impl ActionDescriptor {
    pub fn new(action_type: ActionType, current_id: Option<Value>) -> Self {
        Self {
            action_type,
            current_id,
        }
    }
}

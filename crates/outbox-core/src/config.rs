use outbox_transport::Method;

use crate::options::ApplyState;
use crate::retry::RetryPolicy;

/// Per-outbox configuration.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Service root every item url is joined onto.
    pub service: String,
    /// Method used when a save does not name one.
    pub sync_method: Method,
    /// Aggregation endpoint (joined onto `service`); `None` disables batching.
    pub batch_service: Option<String>,
    /// Minimum pending items before a batch is attempted.
    pub batch_size_min: usize,
    /// Most items sent in one batch.
    pub batch_size_max: usize,
    /// Default apply-state for saves that do not override it.
    pub apply_state: ApplyState,
    /// Drop synced and plain-temporary items at startup.
    pub clean_outbox: bool,
    /// Form field name the CSRF token is stamped into.
    pub csrf_token_field: String,
    /// Query parameters added to every request. A `format` entry becomes a
    /// `.{format}` path suffix unless `format_keyword` keeps it as a param.
    pub defaults: Vec<(String, String)>,
    pub format_keyword: bool,
    pub retry: RetryPolicy,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            service: String::new(),
            sync_method: Method::Post,
            batch_service: None,
            batch_size_min: 2,
            batch_size_max: 50,
            apply_state: ApplyState::OnSuccess,
            clean_outbox: true,
            csrf_token_field: "csrfmiddlewaretoken".to_string(),
            defaults: Vec::new(),
            format_keyword: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl OutboxConfig {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Default::default()
        }
    }
}

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportResult;
use crate::request::TransportRequest;

/// One network attempt. Implementations send the request exactly once and
/// report the outcome; retry scheduling belongs to the queue, not here.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return the parsed JSON response body, if any.
    ///
    /// Non-2xx responses are errors carrying the status and raw body.
    async fn send(&self, request: TransportRequest) -> TransportResult<Option<Value>>;
}

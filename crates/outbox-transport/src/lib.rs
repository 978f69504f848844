//! HTTP transport port for the outbox.
//!
//! The queue builds a [`TransportRequest`] describing one mutation and hands
//! it to a [`Transport`]. The shipped implementation is [`HttpTransport`] on
//! `reqwest`; tests substitute scripted transports.

mod error;
mod http;
mod request;
mod transport;

pub use error::{TransportError, TransportResult};
pub use http::{HttpTransport, HttpTransportConfig};
pub use request::{FormField, FormValue, Method, RequestBody, TransportRequest};
pub use transport::Transport;

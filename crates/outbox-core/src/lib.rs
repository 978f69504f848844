//! Offline-first outbox: a durable, retryable, at-least-once delivery queue
//! for client-originated mutations.
//!
//! Saves enter the queue through [`Outbox::save`], which applies the
//! apply-state decision table and optionally spills payloads to a
//! [`PayloadStore`](outbox_storage::PayloadStore). A background drain worker
//! sends pending items through a
//! [`Transport`](outbox_transport::Transport) one attempt at a time,
//! batching independent items when an aggregation endpoint is configured,
//! backing off on transient failures, and resolving `outbox-<n>` parent
//! references as parents commit.

pub mod action;
pub mod batch;
pub mod config;
pub mod error;
pub mod form;
pub mod item;
pub mod options;
pub mod outbox;
pub mod registry;
pub mod retry;
pub mod state;

mod effect;

pub use action::{ActionDescriptor, ActionLabel, ActionScope, ActionType};
pub use config::OutboxConfig;
pub use error::{OutboxError, OutboxResult};
pub use form::parse_json_form;
pub use item::{OutboxItem, QueuedAction, SyncError, MISSING_DATA_LABEL};
pub use options::{ApplyState, ModelConf, SaveOptions, StorageMode};
pub use outbox::Outbox;
pub use registry::OutboxRegistry;
pub use retry::{RetryDecision, RetryPolicy};
pub use state::{OutboxState, QueueEvent, ResultAction};

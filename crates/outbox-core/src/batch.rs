use std::collections::{BTreeMap, HashMap};

use outbox_transport::TransportError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::action::ActionDescriptor;
use crate::config::OutboxConfig;
use crate::effect;
use crate::form;
use crate::item::{QueuedAction, SyncError};
use crate::options::StorageMode;
use crate::state::ResultAction;

/// One request inside the aggregated batch body.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRequestEntry {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// One entry of the batch service's response array. Correlation with
/// requests is positional.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchEntryResponse {
    pub status_code: u16,
    #[serde(default)]
    pub body: Option<String>,
}

/// Routing for one batch member, captured when the batch was built.
#[derive(Debug, Clone)]
pub(crate) struct BatchMember {
    pub id: u64,
    pub commit: ActionDescriptor,
    pub rollback: ActionDescriptor,
    pub payload: Option<Value>,
}

#[derive(Debug)]
pub(crate) struct BatchJob {
    /// Correlates log lines; the wire protocol stays positional.
    pub batch_id: Uuid,
    pub members: Vec<BatchMember>,
    pub entries: Vec<BatchRequestEntry>,
}

/// Build a batch from a snapshot of eligible items. Any member that cannot
/// produce a JSON body (persistent payloads, load failures) abandons the
/// batch for this cycle; the caller falls back to single sends.
pub(crate) fn build_batch(
    config: &OutboxConfig,
    csrf_token: Option<&str>,
    actions: &[&QueuedAction],
    memory_items: &HashMap<u64, Value>,
) -> Option<BatchJob> {
    let mut members = Vec::with_capacity(actions.len());
    let mut entries = Vec::with_capacity(actions.len());

    for action in actions {
        let id = action.meta.outbox_id;
        let options = &action.effect.options;
        let (Some(commit), Some(rollback)) = (&action.commit, &action.rollback) else {
            warn!(outbox_id = id, "Batch member missing routing; falling back");
            return None;
        };

        let data = match options.storage {
            StorageMode::Inline => action.effect.data.clone().unwrap_or_else(|| Value::Object(Default::default())),
            StorageMode::Temporary => match memory_items.get(&id) {
                Some(data) => data.clone(),
                None => {
                    warn!(outbox_id = id, "Batch member payload missing; falling back");
                    return None;
                }
            },
            StorageMode::Persistent => {
                debug!(outbox_id = id, "Persistent payloads are not batchable");
                return None;
            }
        };

        let Some(suffix) = options.url.as_deref() else {
            warn!(outbox_id = id, "Batch member has no url; falling back");
            return None;
        };
        let url = match effect::build_url(config, suffix) {
            Ok(url) => url,
            Err(e) => {
                warn!(outbox_id = id, error = %e, "Batch member url invalid; falling back");
                return None;
            }
        };

        let method = options.method.unwrap_or(config.sync_method);
        let body = if method.is_delete() {
            String::new()
        } else {
            match serde_json::to_string(&form::parse_json_form(&data)) {
                Ok(body) => body,
                Err(e) => {
                    warn!(outbox_id = id, error = %e, "Batch member body unserializable");
                    return None;
                }
            }
        };

        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        if let Some(token) = csrf_token {
            headers.insert("X-CSRFToken".to_string(), token.to_string());
        }

        members.push(BatchMember {
            id,
            commit: commit.clone(),
            rollback: rollback.clone(),
            payload: action.payload.clone(),
        });
        entries.push(BatchRequestEntry {
            url,
            method: method.to_string(),
            headers,
            body,
        });
    }

    Some(BatchJob {
        batch_id: Uuid::new_v4(),
        members,
        entries,
    })
}

fn parse_entry_body(body: Option<&str>) -> Option<Value> {
    let body = body?;
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str(body) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(body.to_string())),
    }
}

fn all_rolled_back(members: &[BatchMember], error: SyncError) -> Vec<ResultAction> {
    members
        .iter()
        .map(|member| {
            ResultAction::rolled_back(
                member.id,
                member.rollback.action_type.clone(),
                error.clone(),
            )
        })
        .collect()
}

/// Zip the batch response onto its members, synthesizing one commit or
/// rollback per member. A transport-level failure rolls every member back.
pub(crate) fn process_batch_response(
    members: &[BatchMember],
    outcome: Result<Option<Value>, SyncError>,
) -> Vec<ResultAction> {
    let value = match outcome {
        Ok(Some(value)) => value,
        Ok(None) => {
            return all_rolled_back(members, SyncError::from_text("Empty batch response"));
        }
        Err(error) => return all_rolled_back(members, error),
    };

    let responses: Vec<BatchEntryResponse> = match serde_json::from_value(value) {
        Ok(responses) => responses,
        Err(_) => {
            return all_rolled_back(members, SyncError::from_text("Invalid batch response"));
        }
    };

    members
        .iter()
        .enumerate()
        .map(|(index, member)| match responses.get(index) {
            Some(response) if (200..300).contains(&response.status_code) => {
                let payload =
                    parse_entry_body(response.body.as_deref()).or_else(|| member.payload.clone());
                ResultAction::committed(member.id, member.commit.action_type.clone(), payload)
            }
            Some(response) => {
                let error = SyncError::from_transport(&TransportError::Status {
                    status: response.status_code,
                    body: response.body.clone(),
                });
                ResultAction::rolled_back(member.id, member.rollback.action_type.clone(), error)
            }
            None => ResultAction::rolled_back(
                member.id,
                member.rollback.action_type.clone(),
                SyncError::from_text("Missing batch response"),
            ),
        })
        .collect()
}

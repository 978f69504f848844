use outbox_transport::{RequestBody, Transport, TransportRequest};
use serde_json::Value;
use url::Url;

use crate::config::OutboxConfig;
use crate::error::{OutboxError, OutboxResult};
use crate::form;
use crate::options::SaveOptions;

/// Join the service root with an item's url suffix and apply configured
/// default parameters. The `format` default becomes a path suffix
/// (`items.json`) unless `format_keyword` keeps it as a query parameter.
pub(crate) fn build_url(config: &OutboxConfig, suffix: &str) -> OutboxResult<String> {
    let mut path = format!(
        "{}/{}",
        config.service.trim_end_matches('/'),
        suffix.trim_start_matches('/')
    );
    let mut params: Vec<(&str, &str)> = Vec::new();
    for (key, value) in &config.defaults {
        if key == "format" && !config.format_keyword {
            path = format!("{}.{}", path.trim_end_matches('/'), value);
        } else {
            params.push((key.as_str(), value.as_str()));
        }
    }
    if params.is_empty() {
        return Ok(path);
    }
    let mut url = Url::parse(&path)
        .map_err(|e| OutboxError::InvalidAction(format!("invalid url {path}: {e}")))?;
    url.query_pairs_mut().extend_pairs(params);
    Ok(url.to_string())
}

/// Build the network request for one queued item.
///
/// The CSRF token travels as an `X-CSRFToken` header and, for form bodies, is
/// also stamped into the configured form field. DELETE requests carry no
/// body: the target id is in the url.
pub(crate) fn build_request(
    config: &OutboxConfig,
    csrf_token: Option<&str>,
    options: &SaveOptions,
    data: &Value,
) -> OutboxResult<TransportRequest> {
    let method = options.method.unwrap_or(config.sync_method);
    let suffix = options
        .url
        .as_deref()
        .ok_or_else(|| OutboxError::InvalidAction("queued item has no url".into()))?;
    let url = build_url(config, suffix)?;

    let mut headers = Vec::new();
    let mut data = data.clone();
    if let Some(token) = csrf_token {
        headers.push(("X-CSRFToken".to_string(), token.to_string()));
        if !options.json && !method.is_delete() {
            if let Some(object) = data.as_object_mut() {
                object.insert(
                    config.csrf_token_field.clone(),
                    Value::String(token.to_string()),
                );
            }
        }
    }

    let body = if method.is_delete() {
        RequestBody::Empty
    } else if options.json {
        RequestBody::Json(data)
    } else {
        RequestBody::Form(form::form_fields(&data)?)
    };

    Ok(TransportRequest {
        url,
        method,
        headers,
        body,
    })
}

/// Run one network attempt for an item. A DELETE that returns no body (many
/// servers 204 deletes) commits with the original target id so downstream
/// consumers still learn what was deleted.
pub(crate) async fn execute(
    transport: &dyn Transport,
    config: &OutboxConfig,
    csrf_token: Option<&str>,
    options: &SaveOptions,
    payload: Option<&Value>,
    data: &Value,
) -> OutboxResult<Option<Value>> {
    let request = build_request(config, csrf_token, options, data)?;
    let method = request.method;
    let response = transport.send(request).await?;

    if method.is_delete() {
        let empty = match &response {
            None => true,
            Some(Value::Null) => true,
            Some(Value::String(text)) => text.is_empty(),
            _ => false,
        };
        if empty {
            return Ok(payload.cloned());
        }
    }
    Ok(response)
}

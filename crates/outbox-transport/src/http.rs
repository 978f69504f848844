use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use serde_json::Value;
use tracing::debug;

use crate::error::{TransportError, TransportResult};
use crate::request::{FormField, FormValue, Method, RequestBody, TransportRequest};
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub timeout_secs: u64,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// `Transport` backed by a shared `reqwest` client with a request timeout.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> TransportResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

fn build_form(fields: Vec<FormField>) -> TransportResult<multipart::Form> {
    let mut form = multipart::Form::new();
    for field in fields {
        form = match field.value {
            FormValue::Text(text) => form.text(field.name, text),
            FormValue::File {
                filename,
                content_type,
                bytes,
            } => {
                let part = multipart::Part::bytes(bytes)
                    .file_name(filename)
                    .mime_str(&content_type)?;
                form.part(field.name, part)
            }
        };
    }
    Ok(form)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> TransportResult<Option<Value>> {
        debug!(url = %request.url, method = %request.method, "Sending outbox request");

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
            Method::Patch => self.client.patch(&request.url),
            Method::Delete => self.client.delete(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        builder = match request.body {
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Form(fields) => builder.multipart(build_form(fields)?),
            RequestBody::Empty => builder,
        };

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: if text.is_empty() { None } else { Some(text) },
            });
        }

        if text.trim().is_empty() {
            return Ok(None);
        }
        // Non-JSON success bodies are passed through as strings.
        match serde_json::from_str(&text) {
            Ok(value) => Ok(Some(value)),
            Err(_) => Ok(Some(Value::String(text))),
        }
    }
}

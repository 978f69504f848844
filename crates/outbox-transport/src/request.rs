use serde::{Deserialize, Serialize};

/// HTTP method for a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Method::Delete)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single multipart form field.
#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    pub value: FormValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File {
        filename: String,
        content_type: String,
        bytes: Vec<u8>,
    },
}

/// Request body shape: JSON document, multipart form, or nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<FormField>),
    Empty,
}

/// A fully-built request, ready for a [`Transport`](crate::Transport) to send.
/// Construction (URL joining, headers, serialization choices) happens upstream
/// so transports stay dumb.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Method::Post).unwrap(), "\"POST\"");
        assert_eq!(
            serde_json::from_str::<Method>("\"DELETE\"").unwrap(),
            Method::Delete
        );
    }

    #[test]
    fn method_display_matches_wire_form() {
        assert_eq!(Method::Patch.to_string(), "PATCH");
        assert!(Method::Delete.is_delete());
        assert!(!Method::Post.is_delete());
    }
}

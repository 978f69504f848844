use base64::Engine;
use outbox_transport::{FormField, FormValue};
use serde_json::{Map, Value};

use crate::error::{OutboxError, OutboxResult};

/// One step of a bracketed form name (`list[0][photo]`).
#[derive(Debug, Clone, PartialEq, Eq)]
enum KeySegment {
    Key(String),
    Index(usize),
    Append,
}

fn parse_name(name: &str) -> Vec<KeySegment> {
    let mut segments = Vec::new();
    let (base, mut rest) = match name.find('[') {
        Some(pos) => (&name[..pos], &name[pos..]),
        None => (name, ""),
    };
    segments.push(KeySegment::Key(base.to_string()));
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(end) = stripped.find(']') else {
            // Unbalanced bracket: treat the remainder as a literal key.
            segments.push(KeySegment::Key(stripped.to_string()));
            break;
        };
        let part = &stripped[..end];
        if part.is_empty() {
            segments.push(KeySegment::Append);
        } else if let Ok(index) = part.parse::<usize>() {
            segments.push(KeySegment::Index(index));
        } else {
            segments.push(KeySegment::Key(part.to_string()));
        }
        rest = &stripped[end + 1..];
    }
    segments
}

fn insert_path(target: &mut Value, segments: &[KeySegment], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        *target = value;
        return;
    };
    match first {
        KeySegment::Key(key) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Some(map) = target.as_object_mut() {
                let slot = map.entry(key.clone()).or_insert(Value::Null);
                insert_path(slot, rest, value);
            }
        }
        KeySegment::Index(index) => {
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            if let Some(array) = target.as_array_mut() {
                while array.len() <= *index {
                    array.push(Value::Null);
                }
                insert_path(&mut array[*index], rest, value);
            }
        }
        KeySegment::Append => {
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            if let Some(array) = target.as_array_mut() {
                array.push(Value::Null);
                let last = array.len() - 1;
                insert_path(&mut array[last], rest, value);
            }
        }
    }
}

/// Expand flat bracket-notation form data (`{"list[0][x]": "y"}`) into nested
/// JSON, stamping `@index` on object rows of top-level arrays so repeat
/// groups keep their position. Non-object input passes through unchanged.
pub fn parse_json_form(data: &Value) -> Value {
    let Some(object) = data.as_object() else {
        return data.clone();
    };
    let mut root = Value::Object(Map::new());
    for (name, value) in object {
        insert_path(&mut root, &parse_name(name), value.clone());
    }
    if let Some(map) = root.as_object_mut() {
        for value in map.values_mut() {
            if let Some(rows) = value.as_array_mut() {
                for (index, row) in rows.iter_mut().enumerate() {
                    if let Some(row) = row.as_object_mut() {
                        row.entry("@index".to_string())
                            .or_insert_with(|| Value::from(index));
                    }
                }
            }
        }
    }
    root
}

/// A `{name, type, body}` object is a file attachment: `body` is base64 text
/// or an array of byte values.
fn as_file_payload(value: &Value) -> Option<(&str, &str, &Value)> {
    let object = value.as_object()?;
    let name = object.get("name")?.as_str()?;
    let content_type = object.get("type")?.as_str()?;
    let body = object.get("body")?;
    Some((name, content_type, body))
}

fn decode_body(body: &Value) -> OutboxResult<Vec<u8>> {
    match body {
        Value::String(text) => base64::engine::general_purpose::STANDARD
            .decode(text)
            .map_err(|e| OutboxError::InvalidPayload(format!("bad base64 body: {e}"))),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .filter(|b| *b <= u8::MAX as u64)
                    .map(|b| b as u8)
                    .ok_or_else(|| OutboxError::InvalidPayload("bad byte in body".into()))
            })
            .collect(),
        _ => Err(OutboxError::InvalidPayload(
            "file body must be base64 text or a byte array".into(),
        )),
    }
}

fn field_for(name: &str, value: &Value) -> OutboxResult<FormField> {
    if let Some((filename, content_type, body)) = as_file_payload(value) {
        return Ok(FormField {
            name: name.to_string(),
            value: FormValue::File {
                filename: filename.to_string(),
                // Always apply the declared type; serialized blobs lose theirs.
                content_type: content_type.to_string(),
                bytes: decode_body(body)?,
            },
        });
    }
    let text = match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    Ok(FormField {
        name: name.to_string(),
        value: FormValue::Text(text),
    })
}

/// Flatten form data into multipart fields: arrays append one field per
/// element under the same name; file payloads become file parts.
pub fn form_fields(data: &Value) -> OutboxResult<Vec<FormField>> {
    let mut fields = Vec::new();
    let Some(object) = data.as_object() else {
        return Ok(fields);
    };
    for (name, value) in object {
        match value {
            Value::Array(items) => {
                for item in items {
                    fields.push(field_for(name, item)?);
                }
            }
            other => fields.push(field_for(name, other)?),
        }
    }
    Ok(fields)
}

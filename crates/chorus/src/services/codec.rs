//! Decoding of the embedding encodings found in the wild: JSON array text, comma
//! separated text, native sequences and arbitrary JSON values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An embedding as received, before it has been checked for shape or content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawEmbedding {
  /// Numeric array, the form produced by embedding services
  Array(Vec<f32>),
  /// Native double precision sequence
  Sequence(Vec<f64>),
  /// JSON array text (`"[0.1, 0.2]"`) or comma separated text (`"0.1,0.2"`)
  Text(String),
  /// Anything else a collector handed us
  Json(Value),
}

impl From<Vec<f32>> for RawEmbedding {
  fn from(values: Vec<f32>) -> Self {
    RawEmbedding::Array(values)
  }
}

/// Decode a raw embedding into a vector of finite floats.
///
/// `None` means the payload should be skipped for indexing: it was empty, had a
/// non-numeric or non-finite element, or was a JSON shape other than an array.
pub fn decode(raw: &RawEmbedding) -> Option<Vec<f32>> {
  match raw {
    RawEmbedding::Array(values) => finite(values.clone()),
    RawEmbedding::Sequence(values) => finite(values.iter().map(|v| *v as f32).collect()),
    RawEmbedding::Text(text) => decode_text(text),
    RawEmbedding::Json(value) => decode_json(value),
  }
}

/// Text persisted in the durable `embedding` column.
///
/// Decodable payloads are stored as canonical JSON arrays; anything else is kept
/// verbatim so upstream can correct it.
pub fn encode_column(raw: &RawEmbedding) -> String {
  match decode(raw) {
    Some(vector) => serde_json::to_string(&vector).unwrap_or_else(|_| verbatim(raw)),
    None => verbatim(raw),
  }
}

fn verbatim(raw: &RawEmbedding) -> String {
  match raw {
    RawEmbedding::Text(text) => text.clone(),
    RawEmbedding::Json(value) => value.to_string(),
    RawEmbedding::Array(values) => render_list(values.iter().map(ToString::to_string)),
    RawEmbedding::Sequence(values) => render_list(values.iter().map(ToString::to_string)),
  }
}

/// JSON has no spelling for NaN or infinity, so numbers are written with `Display`
fn render_list(items: impl Iterator<Item = String>) -> String {
  format!("[{}]", items.collect::<Vec<_>>().join(", "))
}

fn decode_text(text: &str) -> Option<Vec<f32>> {
  let trimmed = text.trim();
  if trimmed.is_empty() {
    return None;
  }

  if trimmed.starts_with('[') {
    let value: Value = serde_json::from_str(trimmed).ok()?;
    return decode_json_array(&value);
  }

  let values = trimmed
    .split(',')
    .map(|part| part.trim().parse::<f32>().ok())
    .collect::<Option<Vec<f32>>>()?;
  finite(values)
}

fn decode_json(value: &Value) -> Option<Vec<f32>> {
  match value {
    Value::String(text) => decode_text(text),
    Value::Array(_) => decode_json_array(value),
    _ => None,
  }
}

fn decode_json_array(value: &Value) -> Option<Vec<f32>> {
  let items = value.as_array()?;
  let values = items.iter().map(|item| item.as_f64().map(|v| v as f32)).collect::<Option<Vec<f32>>>()?;
  finite(values)
}

fn finite(values: Vec<f32>) -> Option<Vec<f32>> {
  if values.is_empty() || values.iter().any(|v| !v.is_finite()) {
    return None;
  }
  Some(values)
}

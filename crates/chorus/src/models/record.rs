use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ValidationConfig;
use crate::errors::RecordRejection;
use crate::services::codec::RawEmbedding;

/// Source platform a record was collected from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Platform {
  Slack,
  Github,
  GoogleCalendar,
  Facebook,
  Other(String),
}

impl Platform {
  pub fn as_str(&self) -> &str {
    match self {
      Platform::Slack => "slack",
      Platform::Github => "github",
      Platform::GoogleCalendar => "google_calendar",
      Platform::Facebook => "facebook",
      Platform::Other(name) => name,
    }
  }

  pub fn parse(name: &str) -> Self {
    let normalized = name.trim().to_lowercase();
    match normalized.as_str() {
      "slack" => Platform::Slack,
      "github" => Platform::Github,
      "google_calendar" | "calendar" => Platform::GoogleCalendar,
      "facebook" => Platform::Facebook,
      _ => Platform::Other(normalized),
    }
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Platform {
  type Err = Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(Platform::parse(s))
  }
}

impl From<String> for Platform {
  fn from(name: String) -> Self {
    Platform::parse(&name)
  }
}

impl From<Platform> for String {
  fn from(platform: Platform) -> Self {
    platform.as_str().to_string()
  }
}

/// A piece of community content as handed over by a collector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
  pub id: String,
  pub platform: Platform,
  pub content: String,
  pub author: String,
  pub timestamp: DateTime<Utc>,
  #[serde(default)]
  pub source_url: String,
  #[serde(default)]
  pub metadata: Map<String, Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub embedding: Option<RawEmbedding>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub updated_at: Option<DateTime<Utc>>,
}

impl Record {
  pub fn new(
    id: impl Into<String>,
    platform: Platform,
    content: impl Into<String>,
    author: impl Into<String>,
    timestamp: DateTime<Utc>,
  ) -> Self {
    Self {
      id: id.into(),
      platform,
      content: content.into(),
      author: author.into(),
      timestamp,
      source_url: String::new(),
      metadata: Map::new(),
      embedding: None,
      created_at: None,
      updated_at: None,
    }
  }

  pub fn with_embedding(mut self, embedding: RawEmbedding) -> Self {
    self.embedding = Some(embedding);
    self
  }

  pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
    self.metadata.insert(key.into(), value);
    self
  }

  pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
    self.source_url = url.into();
    self
  }

  /// Checks the collector merge rules. Embeddings are not looked at here.
  pub fn validate(&self, rules: &ValidationConfig) -> Result<(), RecordRejection> {
    let required: [(&'static str, &str); 4] = [
      ("id", self.id.as_str()),
      ("platform", self.platform.as_str()),
      ("content", self.content.as_str()),
      ("author", self.author.as_str()),
    ];
    for (field, value) in required {
      if value.trim().is_empty() {
        return Err(RecordRejection::MissingField { field });
      }
    }

    let length = self.content.chars().count();
    if length > rules.max_content_length {
      return Err(RecordRejection::ContentTooLong { length, max: rules.max_content_length });
    }

    let size = self.metadata_json().len();
    if size > rules.max_metadata_bytes {
      return Err(RecordRejection::MetadataTooLarge { size, max: rules.max_metadata_bytes });
    }

    Ok(())
  }

  pub fn metadata_json(&self) -> String {
    Value::Object(self.metadata.clone()).to_string()
  }
}

/// A record as read back from the store, without its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
  pub id: String,
  pub platform: Platform,
  pub content: String,
  pub author: String,
  pub timestamp: DateTime<Utc>,
  pub source_url: String,
  pub metadata: Map<String, Value>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// A similarity search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
  #[serde(flatten)]
  pub record: StoredRecord,
  pub similarity: f32,
}

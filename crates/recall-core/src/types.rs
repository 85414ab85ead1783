//! Domain types stored in and returned by the index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type EntryId = String;
pub type Meta = BTreeMap<String, MetaValue>;

/// A scalar metadata value attached to an entry.
///
/// Serialized untagged so the on-disk form is a plain JSON scalar. Whole
/// numbers decode as `Int` and keep their exact value; `Number` must be
/// finite to survive a JSON round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Number(f64),
    Text(String),
}

impl MetaValue {
    /// A `Number`, or `None` for NaN and infinities.
    pub fn number(value: f64) -> Option<Self> {
        value.is_finite().then_some(Self::Number(value))
    }

    /// False only for a non-finite `Number`, which JSON cannot represent.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Number(n) => n.is_finite(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// One retrievable document.
///
/// - `id`: producer-supplied key, unique within the index
/// - `kind`: opaque type tag ("news", "video", "market", ...), serialized as `type`
/// - `title`/`content`: the searchable text; lower-case shadows are derived
///   and never serialized
/// - `metadata`: round-tripped verbatim
/// - `embedding`/`embedding_hash`: present together or not at all; the hash
///   is taken over the exact text that was embedded
/// - `indexed_at`: time of the last write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: EntryId,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub content: String,
    #[serde(skip)]
    title_lower: String,
    #[serde(skip)]
    content_lower: String,
    #[serde(default)]
    pub metadata: Meta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub embedding_hash: String,
    pub indexed_at: DateTime<Utc>,
}

impl IndexEntry {
    /// Build an entry without an embedding, stamped with the current time.
    pub fn new(
        id: impl Into<String>,
        kind: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        metadata: Meta,
    ) -> Self {
        let mut entry = Self {
            id: id.into(),
            kind: kind.into(),
            title: title.into(),
            content: content.into(),
            title_lower: String::new(),
            content_lower: String::new(),
            metadata,
            embedding: Vec::new(),
            embedding_hash: String::new(),
            indexed_at: Utc::now(),
        };
        entry.refresh_lowercase();
        entry
    }

    /// Attach an embedding together with the hash of its source text.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>, source_hash: String) -> Self {
        if embedding.is_empty() {
            return self;
        }
        self.embedding = embedding;
        self.embedding_hash = source_hash;
        self
    }

    /// Recompute the lower-case shadow fields. Needed after deserialization.
    pub fn refresh_lowercase(&mut self) {
        self.title_lower = self.title.to_lowercase();
        self.content_lower = self.content.to_lowercase();
    }

    pub fn title_lower(&self) -> &str {
        &self.title_lower
    }

    pub fn content_lower(&self) -> &str {
        &self.content_lower
    }

    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }

    /// True when `kind`, `title`, `content` and `metadata` all match.
    pub fn same_payload(&self, kind: &str, title: &str, content: &str, metadata: &Meta) -> bool {
        self.kind == kind && self.title == title && self.content == content && &self.metadata == metadata
    }
}

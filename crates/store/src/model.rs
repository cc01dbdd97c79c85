//! The persisted data model: events, templates, and the level enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed severity enum. `WARN` and `WARNING` are distinct on the wire and
/// stay distinct here; collapsing them would change template identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Warning,
    Error,
    Critical,
    Fatal,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" => Ok(LogLevel::Warn),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            "FATAL" => Ok(LogLevel::Fatal),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// One raw journal record, immutable after insert except for the write-once
/// `template_id` back-reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic key assigned at insert time.
    pub id: u64,
    /// Event instant, microsecond precision, UTC.
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub service: String,
    pub host: String,
    pub level: LogLevel,
    /// Raw message text, preserved byte-for-byte (CR/LF, NULs and all).
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Free-form attribute bag; persisted as JSON, never used for routing.
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
    /// 128-bit dedup fingerprint over (timestamp, service, host, message).
    pub log_hash: String,
    /// Back-reference to the template; null when the live path failed to
    /// resolve one (the safety net fills it exactly once).
    #[serde(default)]
    pub template_id: Option<u64>,
}

/// An event as it arrives at the store: everything except the id the store
/// assigns.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub service: String,
    pub host: String,
    pub level: LogLevel,
    pub message: String,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub event_type: Option<String>,
    pub error_code: Option<String>,
    pub meta: serde_json::Map<String, serde_json::Value>,
    pub log_hash: String,
    pub template_id: Option<u64>,
}

impl NewEvent {
    pub(crate) fn into_event(self, id: u64) -> Event {
        Event {
            id,
            timestamp: self.timestamp,
            source: self.source,
            service: self.service,
            host: self.host,
            level: self.level,
            message: self.message,
            trace_id: self.trace_id,
            span_id: self.span_id,
            event_type: self.event_type,
            error_code: self.error_code,
            meta: self.meta,
            log_hash: self.log_hash,
            template_id: self.template_id,
        }
    }
}

/// One canonical log pattern: the deduplicated unit of memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: u64,
    /// 128-bit fingerprint over (service, level, canon_version,
    /// canonical_text). Unique.
    pub template_hash: String,
    pub canonical_text: String,
    pub service: String,
    pub level: LogLevel,
    /// Dense vector; transiently absent until the live path or the safety
    /// net attaches it. Never mutated afterwards except by a versioned
    /// migration.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub embedding_dim: Option<usize>,
    pub canon_version: u32,
    pub chunk_version: u32,
    pub event_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Template {
    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }
}

/// A template as it is first sighted, before the store assigns an id and
/// counters.
#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub template_hash: String,
    pub canonical_text: String,
    pub service: String,
    pub level: LogLevel,
    pub canon_version: u32,
    pub chunk_version: u32,
    pub first_seen: DateTime<Utc>,
}

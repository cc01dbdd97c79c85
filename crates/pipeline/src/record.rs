//! Wire-format ingest records and per-record validation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use store::{LogLevel, NewEvent};

/// One candidate event as submitted by a shipper. Matches the event schema
/// minus the store-assigned fields (`id`, `log_hash`, `template_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_source")]
    pub source: String,
    pub service: String,
    pub host: String,
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub span_id: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

fn default_source() -> String {
    "journal".to_string()
}

/// A per-record validation or processing failure. The rest of the batch
/// proceeds; the shipper sees these in the response and must not retry the
/// offending records unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordError {
    /// Index of the record in the submitted batch.
    pub index: usize,
    pub reason: String,
}

/// Schema/enum/time-skew checks applied before the write path proper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Tolerated clock skew into the future, in seconds.
    #[serde(default = "default_max_future_skew_secs")]
    pub max_future_skew_secs: u64,
    /// Bound on the short identifier fields (source, service, host, ...).
    #[serde(default = "default_max_ident_len")]
    pub max_ident_len: usize,
    /// Bound on the raw message, in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_future_skew_secs: default_max_future_skew_secs(),
            max_ident_len: default_max_ident_len(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

fn default_max_future_skew_secs() -> u64 {
    300
}

fn default_max_ident_len() -> usize {
    256
}

fn default_max_message_bytes() -> usize {
    256 * 1024
}

impl IngestRecord {
    /// Validate and convert into a store-ready event (without its hash,
    /// which the pipeline computes next).
    pub fn validate(self, cfg: &ValidationConfig, now: DateTime<Utc>) -> Result<NewEvent, String> {
        let level: LogLevel = self.level.parse()?;

        if self.service.is_empty() {
            return Err("service must not be empty".into());
        }
        if self.host.is_empty() {
            return Err("host must not be empty".into());
        }
        for (name, value) in [
            ("source", &self.source),
            ("service", &self.service),
            ("host", &self.host),
        ] {
            if value.len() > cfg.max_ident_len {
                return Err(format!(
                    "{name} exceeds {} bytes",
                    cfg.max_ident_len
                ));
            }
        }
        if self.message.len() > cfg.max_message_bytes {
            return Err(format!(
                "message exceeds {} bytes",
                cfg.max_message_bytes
            ));
        }

        let horizon = now + Duration::seconds(cfg.max_future_skew_secs as i64);
        if self.timestamp > horizon {
            return Err(format!(
                "timestamp {} is further than {}s in the future",
                self.timestamp, cfg.max_future_skew_secs
            ));
        }

        Ok(NewEvent {
            timestamp: self.timestamp,
            source: self.source,
            service: self.service,
            host: self.host,
            level,
            message: self.message,
            trace_id: self.trace_id,
            span_id: self.span_id,
            event_type: self.event_type,
            error_code: self.error_code,
            meta: self.meta,
            log_hash: String::new(),
            template_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(level: &str) -> IngestRecord {
        IngestRecord {
            timestamp: Utc.timestamp_micros(1_000_000).unwrap(),
            source: "journal".into(),
            service: "sshd".into(),
            host: "node-1".into(),
            level: level.into(),
            message: "hello".into(),
            trace_id: None,
            span_id: None,
            event_type: None,
            error_code: None,
            meta: serde_json::Map::new(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_micros(2_000_000).unwrap()
    }

    #[test]
    fn valid_record_converts() {
        let event = record("INFO").validate(&ValidationConfig::default(), now()).unwrap();
        assert_eq!(event.level, LogLevel::Info);
        assert!(event.template_id.is_none());
    }

    #[test]
    fn unknown_level_is_rejected() {
        let err = record("TRACE")
            .validate(&ValidationConfig::default(), now())
            .unwrap_err();
        assert!(err.contains("unknown log level"));
    }

    #[test]
    fn future_timestamps_beyond_skew_are_rejected() {
        let mut r = record("INFO");
        r.timestamp = now() + Duration::seconds(301);
        let err = r.validate(&ValidationConfig::default(), now()).unwrap_err();
        assert!(err.contains("future"));

        let mut r = record("INFO");
        r.timestamp = now() + Duration::seconds(299);
        assert!(r.validate(&ValidationConfig::default(), now()).is_ok());
    }

    #[test]
    fn oversized_fields_are_rejected() {
        let mut r = record("INFO");
        r.service = "s".repeat(300);
        assert!(r.validate(&ValidationConfig::default(), now()).is_err());

        let mut r = record("INFO");
        r.message = "m".repeat(300 * 1024);
        assert!(r.validate(&ValidationConfig::default(), now()).is_err());
    }

    #[test]
    fn empty_service_is_rejected() {
        let mut r = record("INFO");
        r.service = String::new();
        assert!(r.validate(&ValidationConfig::default(), now()).is_err());
    }
}

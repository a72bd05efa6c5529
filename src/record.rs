use crate::level::Level;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Process-wide identity stamped on every record. Resolved once at setup
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    pub service: String,
    pub application: String,
    pub environment: String,
}

impl Default for ServiceIdentity {
    fn default() -> Self {
        Self {
            service: "kaleidoscope-ml-service".to_string(),
            application: "kaleidoscope".to_string(),
            environment: "development".to_string(),
        }
    }
}

/// A log event as it leaves the caller, before enrichment.
///
/// The message is already rendered; nothing downstream formats it again.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub level: Level,
    pub message: String,
    /// Per-call fields. They take precedence over context fields with the
    /// same name for this record only.
    pub fields: BTreeMap<String, Value>,
    pub exception: Option<String>,
}

impl RawEvent {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            fields: BTreeMap::new(),
            exception: None,
        }
    }
}

/// Canonical, immutable representation of one enriched log event.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub logger: String,
    pub message: String,
    pub identity: Arc<ServiceIdentity>,
    pub thread: Option<String>,
    pub correlation_id: String,
    pub fields: BTreeMap<String, Value>,
    pub exception: Option<String>,
}

/// Render an error and its `source()` chain, one cause per line.
pub fn format_error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\nCaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("model inference failed")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_format_error_chain() {
        let err = Outer(std::io::Error::new(std::io::ErrorKind::Other, "gpu unavailable"));
        assert_eq!(
            format_error_chain(&err),
            "model inference failed\nCaused by: gpu unavailable"
        );
    }

    #[test]
    fn test_default_identity() {
        let id = ServiceIdentity::default();
        assert_eq!(id.service, "kaleidoscope-ml-service");
        assert_eq!(id.application, "kaleidoscope");
        assert_eq!(id.environment, "development");
    }
}

use crate::context;
use crate::record::{LogRecord, RawEvent, ServiceIdentity};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Turns a [`RawEvent`] into a [`LogRecord`] by attaching the current
/// diagnostic context and the static service identity.
#[derive(Debug, Clone)]
pub struct Enricher {
    logger: String,
    identity: Arc<ServiceIdentity>,
}

impl Enricher {
    pub fn new(logger: impl Into<String>, identity: Arc<ServiceIdentity>) -> Self {
        Self {
            logger: logger.into(),
            identity,
        }
    }

    pub fn logger_name(&self) -> &str {
        &self.logger
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    /// Build the record for `raw` as seen from the calling unit of work.
    ///
    /// When no correlation id has been set, a fresh UUID v4 is generated for
    /// this record only and is not stored back into the context.
    pub fn enrich(&self, raw: RawEvent) -> LogRecord {
        let ctx = context::snapshot();

        let correlation_id = ctx
            .correlation_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut fields = ctx.fields;
        fields.extend(raw.fields);

        LogRecord {
            timestamp: Utc::now(),
            level: raw.level,
            logger: self.logger.clone(),
            message: raw.message,
            identity: Arc::clone(&self.identity),
            thread: current_thread(),
            correlation_id,
            fields,
            exception: raw.exception,
        }
    }
}

fn current_thread() -> Option<String> {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => Some(name.to_string()),
        None => Some(format!("{:?}", thread.id())),
    }
}

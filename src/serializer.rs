//! Renders [`LogRecord`]s into the JSON document expected by the collector.
//!
//! The `mdc` block is a closed schema: it always carries exactly the keys in
//! [`MDC_KEYS`], `null` when absent, and every other context field is dropped.
//! Values are coerced into the slot's type instead of failing, so
//! serialization cannot fail on user-supplied data.

use crate::level::Level;
use crate::record::LogRecord;
use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub const CORRELATION_ID: &str = "correlationId";
pub const REQUEST_METHOD: &str = "requestMethod";
pub const REQUEST_URI: &str = "requestUri";
pub const RESPONSE_STATUS: &str = "responseStatus";
pub const RESPONSE_TIME_MS: &str = "responseTimeMs";
pub const CLIENT_IP: &str = "clientIp";
pub const USER_AGENT: &str = "userAgent";

/// Keys of the `mdc` block, in output order.
pub const MDC_KEYS: [&str; 7] = [
    CORRELATION_ID,
    REQUEST_METHOD,
    REQUEST_URI,
    RESPONSE_STATUS,
    RESPONSE_TIME_MS,
    CLIENT_IP,
    USER_AGENT,
];

/// One serialized record: UTF-8 JSON without a trailing newline.
///
/// Cloning is cheap, so the same event can be queued for every sink.
#[derive(Clone, PartialEq, Eq)]
pub struct SerializedEvent(Arc<[u8]>);

impl SerializedEvent {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for SerializedEvent {
    fn from(s: String) -> Self {
        SerializedEvent(Arc::from(s.into_bytes()))
    }
}

impl fmt::Debug for SerializedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SerializedEvent").field(&self.as_str()).finish()
    }
}

#[derive(thiserror::Error, Debug)]
#[error("failed to serialize log record: {0}")]
pub struct SerializationError(#[from] serde_json::Error);

#[derive(Serialize)]
struct WireRecord<'a> {
    #[serde(rename = "@timestamp")]
    timestamp: String,
    level: Level,
    logger: &'a str,
    message: &'a str,
    service: &'a str,
    environment: &'a str,
    application: &'a str,
    thread: Option<&'a str>,
    mdc: WireMdc<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exception: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMdc<'a> {
    correlation_id: Option<&'a str>,
    request_method: Value,
    request_uri: Value,
    response_status: Value,
    response_time_ms: Value,
    client_ip: Value,
    user_agent: Value,
}

impl<'a> WireMdc<'a> {
    fn new(correlation_id: &'a str, fields: &BTreeMap<String, Value>) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            request_method: text_slot(fields.get(REQUEST_METHOD)),
            request_uri: text_slot(fields.get(REQUEST_URI)),
            response_status: numeric_slot(fields.get(RESPONSE_STATUS)),
            response_time_ms: numeric_slot(fields.get(RESPONSE_TIME_MS)),
            client_ip: text_slot(fields.get(CLIENT_IP)),
            user_agent: text_slot(fields.get(USER_AGENT)),
        }
    }
}

fn text_slot(value: Option<&Value>) -> Value {
    match value {
        None | Some(Value::Null) => Value::Null,
        Some(Value::String(s)) => Value::String(s.clone()),
        Some(other) => Value::String(other.to_string()),
    }
}

fn numeric_slot(value: Option<&Value>) -> Value {
    match value {
        None | Some(Value::Null) => Value::Null,
        Some(Value::Number(n)) => Value::Number(n.clone()),
        Some(Value::String(s)) => parse_number(s).unwrap_or_else(|| Value::String(s.clone())),
        Some(other) => Value::String(other.to_string()),
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    if let Ok(u) = s.parse::<u64>() {
        return Some(Value::from(u));
    }
    s.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// Serializer for the collector's JSON schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub fn new() -> Self {
        JsonSerializer
    }

    /// Render `record` as a single JSON object.
    ///
    /// Every value reaching `serde_json` is already a string, number or
    /// `null`, so the error branch exists only to keep the contract typed.
    pub fn serialize(&self, record: &LogRecord) -> Result<SerializedEvent, SerializationError> {
        let wire = WireRecord {
            timestamp: record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            level: record.level,
            logger: &record.logger,
            message: &record.message,
            service: &record.identity.service,
            environment: &record.identity.environment,
            application: &record.identity.application,
            thread: record.thread.as_deref(),
            mdc: WireMdc::new(&record.correlation_id, &record.fields),
            exception: record.exception.as_deref(),
        };
        let bytes = serde_json::to_vec(&wire)?;
        Ok(SerializedEvent(Arc::from(bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ServiceIdentity;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn record(fields: Value) -> LogRecord {
        let fields = match fields {
            Value::Object(map) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };
        LogRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 15).unwrap()
                + chrono::Duration::milliseconds(42),
            level: Level::Info,
            logger: "kaleidoscope-ml-service".to_string(),
            message: "Prediction completed".to_string(),
            identity: Arc::new(ServiceIdentity::default()),
            thread: Some("main".to_string()),
            correlation_id: "corr-1".to_string(),
            fields,
            exception: None,
        }
    }

    fn render(record: &LogRecord) -> Value {
        let event = JsonSerializer::new().serialize(record).unwrap();
        serde_json::from_slice(event.as_bytes()).unwrap()
    }

    #[test]
    fn test_exact_field_set() {
        let value = render(&record(json!({})));
        let obj = value.as_object().unwrap();

        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "@timestamp",
                "application",
                "environment",
                "level",
                "logger",
                "mdc",
                "message",
                "service",
                "thread"
            ]
        );

        let mdc = value["mdc"].as_object().unwrap();
        assert_eq!(mdc.len(), MDC_KEYS.len());
        for key in MDC_KEYS {
            assert!(mdc.contains_key(key), "missing mdc key {key}");
        }
    }

    #[test]
    fn test_top_level_values() {
        let value = render(&record(json!({})));
        assert_eq!(value["@timestamp"], "2024-05-01T12:30:15.042Z");
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["service"], "kaleidoscope-ml-service");
        assert_eq!(value["application"], "kaleidoscope");
        assert_eq!(value["environment"], "development");
        assert_eq!(value["thread"], "main");
        assert_eq!(value["mdc"]["correlationId"], "corr-1");
    }

    #[test]
    fn test_absent_fields_are_null() {
        let value = render(&record(json!({})));
        for key in &MDC_KEYS[1..] {
            assert!(value["mdc"][key].is_null(), "{key} should be null");
        }
    }

    #[test]
    fn test_unknown_context_keys_dropped() {
        let value = render(&record(json!({
            "requestMethod": "GET",
            "sessionId": "s-1",
            "referer": "https://example.com"
        })));
        let mdc = value["mdc"].as_object().unwrap();
        assert_eq!(mdc.len(), MDC_KEYS.len());
        assert!(!mdc.contains_key("sessionId"));
        assert!(!mdc.contains_key("referer"));
        assert!(value.get("sessionId").is_none());
    }

    #[test]
    fn test_numeric_slots_parse_strings() {
        let value = render(&record(json!({
            "responseStatus": "200",
            "responseTimeMs": "12.5"
        })));
        assert_eq!(value["mdc"]["responseStatus"], json!(200));
        assert_eq!(value["mdc"]["responseTimeMs"], json!(12.5));
    }

    #[test]
    fn test_numeric_slots_keep_large_unsigned_exact() {
        let value = render(&record(json!({ "responseTimeMs": "18446744073709551615" })));
        assert_eq!(value["mdc"]["responseTimeMs"], json!(u64::MAX));
        assert_eq!(value["mdc"]["responseTimeMs"].as_u64(), Some(u64::MAX));
    }

    #[test]
    fn test_unsupported_values_are_stringified() {
        let value = render(&record(json!({
            "requestMethod": true,
            "requestUri": ["a", "b"],
            "userAgent": 7,
            "responseStatus": "n/a",
            "clientIp": {"v4": "10.0.0.1"}
        })));
        assert_eq!(value["mdc"]["requestMethod"], "true");
        assert_eq!(value["mdc"]["requestUri"], r#"["a","b"]"#);
        assert_eq!(value["mdc"]["userAgent"], "7");
        assert_eq!(value["mdc"]["responseStatus"], "n/a");
        assert_eq!(value["mdc"]["clientIp"], r#"{"v4":"10.0.0.1"}"#);
    }

    #[test]
    fn test_exception_only_when_present() {
        let mut rec = record(json!({}));
        assert!(render(&rec).get("exception").is_none());

        rec.exception = Some("boom\nCaused by: io".to_string());
        assert_eq!(render(&rec)["exception"], "boom\nCaused by: io");
    }

    #[test]
    fn test_no_trailing_newline() {
        let event = JsonSerializer::new().serialize(&record(json!({}))).unwrap();
        assert!(!event.as_str().ends_with('\n'));
        assert!(event.as_str().starts_with("{\"@timestamp\""));
    }
}

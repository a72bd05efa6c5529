//! Populate the diagnostic context from an inbound HTTP request.
//!
//! The helpers are framework-agnostic: callers hand over the request line,
//! the headers as `(name, value)` pairs and the peer address, and get back
//! the standard MDC fields. Header names are matched case-insensitively.

use crate::context::ContextController;
use crate::serializer::{
    CLIENT_IP, REQUEST_METHOD, REQUEST_URI, RESPONSE_STATUS, RESPONSE_TIME_MS, USER_AGENT,
};
use serde_json::Value;
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";
pub const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";
pub const REAL_IP_HEADER: &str = "X-Real-IP";
pub const USER_AGENT_HEADER: &str = "User-Agent";

/// Request attributes relevant to logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: String,
    pub uri: String,
    pub correlation_id: Option<String>,
    pub forwarded_for: Option<String>,
    pub real_ip: Option<String>,
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestInfo {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Collect the logging-relevant headers of a request.
    pub fn from_headers<'a>(
        method: impl Into<String>,
        uri: impl Into<String>,
        headers: impl IntoIterator<Item = (&'a str, &'a str)>,
        remote_addr: Option<&str>,
    ) -> Self {
        let mut info = Self::new(method, uri);
        info.remote_addr = remote_addr.map(str::to_string);

        for (name, value) in headers {
            let slot = if name.eq_ignore_ascii_case(CORRELATION_ID_HEADER) {
                &mut info.correlation_id
            } else if name.eq_ignore_ascii_case(FORWARDED_FOR_HEADER) {
                &mut info.forwarded_for
            } else if name.eq_ignore_ascii_case(REAL_IP_HEADER) {
                &mut info.real_ip
            } else if name.eq_ignore_ascii_case(USER_AGENT_HEADER) {
                &mut info.user_agent
            } else {
                continue;
            };
            if slot.is_none() {
                *slot = Some(value.to_string());
            }
        }
        info
    }

    /// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then
    /// the peer address. Empty and `unknown` header values are skipped.
    pub fn client_ip(&self) -> Option<String> {
        if let Some(forwarded) = usable(self.forwarded_for.as_deref()) {
            let first = forwarded.split(',').next().unwrap_or_default().trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
        if let Some(real_ip) = usable(self.real_ip.as_deref()) {
            return Some(real_ip.trim().to_string());
        }
        self.remote_addr.clone()
    }
}

fn usable(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty() && !v.trim().eq_ignore_ascii_case("unknown"))
}

/// Use the incoming correlation id if present and non-blank, otherwise
/// generate a new UUID v4.
pub fn resolve_correlation_id(header: Option<&str>) -> String {
    match header.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

/// Returned by [`ContextController::begin_request`]; carries the effective
/// correlation id (to echo in the response header) and the start time.
#[derive(Debug, Clone)]
pub struct RequestScope {
    correlation_id: String,
    started: Instant,
}

impl RequestScope {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl ContextController {
    /// Reset the current context to describe `request`.
    ///
    /// Unlike records without an explicit id, the correlation id resolved
    /// here is stored in the context, so every record of the request shares it.
    pub fn begin_request(&self, request: &RequestInfo) -> RequestScope {
        let correlation_id = resolve_correlation_id(request.correlation_id.as_deref());

        let mut fields: Vec<(&str, Value)> = vec![
            (REQUEST_METHOD, Value::from(request.method.as_str())),
            (REQUEST_URI, Value::from(request.uri.as_str())),
        ];
        if let Some(ip) = request.client_ip() {
            fields.push((CLIENT_IP, Value::from(ip)));
        }
        if let Some(agent) = usable(request.user_agent.as_deref()) {
            fields.push((USER_AGENT, Value::from(agent)));
        }

        self.set_correlation_id(correlation_id.clone());
        self.set_context(fields);

        RequestScope {
            correlation_id,
            started: Instant::now(),
        }
    }

    /// Record the response status and elapsed time of the request.
    pub fn finish_request(&self, scope: &RequestScope, status: u16) {
        let elapsed_ms = u64::try_from(scope.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.put(RESPONSE_STATUS, status);
        self.put(RESPONSE_TIME_MS, elapsed_ms);
    }
}

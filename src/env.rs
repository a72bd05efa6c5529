//! Environment variable names read by [`LoggingConfig::from_env`].
//!
//! These are purely helpers; the logger and sinks never read the
//! environment themselves.
//!
//! [`LoggingConfig::from_env`]: crate::init::LoggingConfig::from_env

/// Deployment environment tag, e.g. `production`. Defaults to `development`.
pub const ENVIRONMENT_ENV: &str = "ENVIRONMENT";

/// Boolean-like flag lowering the minimum level to `DEBUG`.
pub const DEBUG_ENV: &str = "DEBUG";

/// Host of the log collector. Defaults to `localhost`.
pub const LOG_COLLECTOR_HOST_ENV: &str = "LOG_COLLECTOR_HOST";

/// TCP port of the log collector. Defaults to `5001`.
pub const LOG_COLLECTOR_PORT_ENV: &str = "LOG_COLLECTOR_PORT";

/// Value of the `service` field.
pub const LOG_SERVICE_NAME_ENV: &str = "LOG_SERVICE_NAME";

/// Value of the `application` field.
pub const LOG_APPLICATION_NAME_ENV: &str = "LOG_APPLICATION_NAME";

/// Interpret a boolean-like string: `true`, `1`, `yes` and `on` are true,
/// case-insensitively; everything else is false.
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

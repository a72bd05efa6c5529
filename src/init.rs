use crate::console::ConsoleSink;
use crate::context::ContextController;
use crate::env::{
    parse_flag, DEBUG_ENV, ENVIRONMENT_ENV, LOG_APPLICATION_NAME_ENV, LOG_COLLECTOR_HOST_ENV,
    LOG_COLLECTOR_PORT_ENV, LOG_SERVICE_NAME_ENV,
};
use crate::layer::MdcLayer;
use crate::level::Level;
use crate::logger::{Logger, DIAGNOSTICS_TARGET};
use crate::record::ServiceIdentity;
use crate::sink::{ConnectError, LogSink};
use tokio::time::Duration;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::{Layer as _, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::Registry;

pub const DEFAULT_COLLECTOR_HOST: &str = "localhost";
pub const DEFAULT_COLLECTOR_PORT: u16 = 5001;

/// Logging configuration.
///
/// **Fields**
/// - `logger_name`: value of the `logger` field of every record.
/// - `identity`: static `service` / `application` / `environment` values.
/// - `debug`: when `true` the minimum level is `DEBUG`, otherwise `INFO`.
/// - `collector_host` / `collector_port`: address of the TCP log collector.
/// - `channel_buffer`: per-sink queue capacity before events are dropped.
/// - `connect_timeout`: bound on connecting to the collector.
/// - `write_timeout`: bound on writing a single event to the collector.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub logger_name: String,
    pub identity: ServiceIdentity,
    pub debug: bool,
    pub collector_host: String,
    pub collector_port: u16,
    pub channel_buffer: usize,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            logger_name: "kaleidoscope-ml-service".to_string(),
            identity: ServiceIdentity::default(),
            debug: false,
            collector_host: DEFAULT_COLLECTOR_HOST.to_string(),
            collector_port: DEFAULT_COLLECTOR_PORT,
            channel_buffer: 1024,
            connect_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(1),
        }
    }
}

impl LoggingConfig {
    /// Build the configuration from process environment variables, see
    /// [`crate::env`] for the names.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup; unset keys keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(environment) = lookup(ENVIRONMENT_ENV) {
            config.identity.environment = environment;
        }
        if let Some(service) = lookup(LOG_SERVICE_NAME_ENV) {
            config.identity.service = service;
        }
        if let Some(application) = lookup(LOG_APPLICATION_NAME_ENV) {
            config.identity.application = application;
        }
        if let Some(debug) = lookup(DEBUG_ENV) {
            config.debug = parse_flag(&debug);
        }
        if let Some(host) = lookup(LOG_COLLECTOR_HOST_ENV) {
            config.collector_host = host;
        }
        if let Some(port) = lookup(LOG_COLLECTOR_PORT_ENV) {
            match port.trim().parse() {
                Ok(port) => config.collector_port = port,
                Err(_) => tracing::warn!(
                    target: DIAGNOSTICS_TARGET,
                    value = %port,
                    "invalid {LOG_COLLECTOR_PORT_ENV}, using {DEFAULT_COLLECTOR_PORT}"
                ),
            }
        }

        config
    }

    pub fn min_level(&self) -> Level {
        if self.debug {
            Level::Debug
        } else {
            Level::Info
        }
    }

    pub fn collector_addr(&self) -> String {
        format!("{}:{}", self.collector_host, self.collector_port)
    }
}

/// Set up the logger with a console sink and a collector sink.
///
/// **Parameters**
/// - `host` / `port`: address of the TCP log collector. Everything else is
///   read from the environment via [`LoggingConfig::from_env`].
///
/// **Returns**
/// - The [`Logger`] and the [`ContextController`] used to manage
///   per-request context.
///
/// If the collector cannot be reached, logging continues console-only and a
/// single `WARNING` record describing the failure is emitted. The initial
/// connection is not retried.
pub async fn setup_logging(host: impl Into<String>, port: u16) -> (Logger, ContextController) {
    let mut config = LoggingConfig::from_env();
    config.collector_host = host.into();
    config.collector_port = port;
    setup_logging_with_config(config).await
}

/// Like [`setup_logging`], with an explicit [`LoggingConfig`].
pub async fn setup_logging_with_config(config: LoggingConfig) -> (Logger, ContextController) {
    setup_logging_with_console(config, ConsoleSink::stdout()).await
}

/// Like [`setup_logging_with_config`], using `console` in place of stdout.
pub async fn setup_logging_with_console(
    config: LoggingConfig,
    console: impl LogSink + 'static,
) -> (Logger, ContextController) {
    let builder = Logger::builder(config.logger_name.clone())
        .identity(config.identity.clone())
        .min_level(config.min_level())
        .channel_buffer(config.channel_buffer)
        .sink(console);

    let logger = match connect_collector(&config).await {
        Ok(collector) => {
            let logger = builder.boxed_sink(collector).build();
            logger.info(format_args!(
                "Connected to log collector at {}",
                config.collector_addr()
            ));
            logger
        }
        Err(e) => {
            let logger = builder.build();
            logger.warning(format_args!("Could not connect to log collector: {e}"));
            logger
        }
    };

    (logger, ContextController::new())
}

#[cfg(feature = "network")]
async fn connect_collector(config: &LoggingConfig) -> Result<Box<dyn LogSink>, ConnectError> {
    use crate::network::{NetworkSink, NetworkSinkConfig};

    let mut sink = NetworkSink::new(NetworkSinkConfig {
        host: config.collector_host.clone(),
        port: config.collector_port,
        connect_timeout: config.connect_timeout,
        write_timeout: config.write_timeout,
    });
    sink.connect().await?;
    Ok(Box::new(sink))
}

#[cfg(not(feature = "network"))]
async fn connect_collector(config: &LoggingConfig) -> Result<Box<dyn LogSink>, ConnectError> {
    Err(ConnectError::Disabled {
        addr: config.collector_addr(),
    })
}

/// Options for [`init_tracing_with_config`].
///
/// **Fields**
/// - `diagnostics_to_stderr`: if `true`, a `fmt` layer prints the crate's
///   own diagnostics (failed writes, dropped events) to stderr.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    pub diagnostics_to_stderr: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            diagnostics_to_stderr: true,
        }
    }
}

/// Install a global `tracing` subscriber that routes every event through
/// `logger`.
///
/// **Returns**
/// - `Err(TryInitError)` if a global subscriber is already installed.
pub fn init_tracing_with_config(logger: Logger, config: TracingConfig) -> Result<(), TryInitError> {
    let layer = MdcLayer::new(logger);

    if config.diagnostics_to_stderr {
        let diagnostics = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(filter_fn(|meta| meta.target() == DIAGNOSTICS_TARGET));
        Registry::default().with(layer).with(diagnostics).try_init()
    } else {
        Registry::default().with(layer).try_init()
    }
}

/// [`init_tracing_with_config`] with [`TracingConfig::default`].
pub fn init_tracing(logger: Logger) -> Result<(), TryInitError> {
    init_tracing_with_config(logger, TracingConfig::default())
}

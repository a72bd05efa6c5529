//! Global `tracing` subscriber routed through the logger.

use tracing_mdc_sink::init::{init_tracing_with_config, TracingConfig};
use tracing_mdc_sink::logger::DIAGNOSTICS_TARGET;
use tracing_mdc_sink::memory_sink::MemorySink;
use tracing_mdc_sink::{ContextController, Logger};

#[tokio::test]
async fn test_init_tracing_routes_events() {
    let memory = MemorySink::new();
    let logger = Logger::builder("bridge").sink(memory.clone()).build();
    init_tracing_with_config(logger.clone(), TracingConfig::default()).unwrap();

    let ctl = ContextController::new();
    ctl.scope(async {
        ctl.set_correlation_id("trace-7");
        tracing::info!(requestUri = "/health", "health check");
        tracing::warn!(target: DIAGNOSTICS_TARGET, "not forwarded");
    })
    .await;
    logger.flush().await;

    let events = memory.json();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["message"], "health check");
    assert_eq!(events[0]["mdc"]["correlationId"], "trace-7");
    assert_eq!(events[0]["mdc"]["requestUri"], "/health");

    assert!(init_tracing_with_config(logger, TracingConfig::default()).is_err());
}

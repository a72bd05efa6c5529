//! End-to-end behaviour of the enrichment, serialization and fan-out pipeline.

use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing_mdc_sink::init::setup_logging_with_console;
use tracing_mdc_sink::memory_sink::MemorySink;
use tracing_mdc_sink::network::{NetworkSink, NetworkSinkConfig};
use tracing_mdc_sink::serializer::MDC_KEYS;
use tracing_mdc_sink::{ContextController, Level, Logger, LoggingConfig};

mod common;

fn quiet_config(debug: bool) -> LoggingConfig {
    LoggingConfig {
        debug,
        collector_host: "127.0.0.1".to_string(),
        collector_port: common::closed_port(),
        ..LoggingConfig::default()
    }
}

fn by_message<'a>(events: &'a [Value], message: &str) -> Vec<&'a Value> {
    events.iter().filter(|e| e["message"] == message).collect()
}

#[tokio::test]
async fn test_prediction_request_scenario() {
    let memory = MemorySink::new();
    let logger = Logger::builder("kaleidoscope-ml-service")
        .sink(memory.clone())
        .build();
    let ctl = ContextController::new();

    ctl.scope(async {
        ctl.set_context([
            ("requestMethod", json!("POST")),
            ("requestUri", json!("/api/ml/predict")),
            ("responseStatus", json!(200)),
        ]);
        logger.log(Level::Info, "Prediction completed");
    })
    .await;
    logger.flush().await;

    let events = memory.json();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event["mdc"]["requestMethod"], "POST");
    assert_eq!(event["mdc"]["requestUri"], "/api/ml/predict");
    assert_eq!(event["mdc"]["responseStatus"], 200);
    assert_eq!(event["mdc"]["clientIp"], Value::Null);
    assert_eq!(event["level"], "INFO");
    assert_eq!(event["message"], "Prediction completed");
}

#[tokio::test]
async fn test_every_record_has_closed_schema() {
    let memory = MemorySink::new();
    let logger = Logger::builder("schema").sink(memory.clone()).build();
    let ctl = ContextController::new();

    ctl.scope(async {
        ctl.set_context([
            ("requestMethod", json!("GET")),
            ("modelVersion", json!("v1.0.0")),
            ("confidence", json!(0.95)),
        ]);
        logger.info("with context");
        ctl.clear_context();
        logger.info("after clear");
        logger.warning("another");
    })
    .await;
    logger.flush().await;

    let expected_top: BTreeSet<&str> = [
        "@timestamp",
        "level",
        "logger",
        "message",
        "service",
        "environment",
        "application",
        "thread",
        "mdc",
    ]
    .into_iter()
    .collect();
    let expected_mdc: BTreeSet<&str> = MDC_KEYS.into_iter().collect();

    let events = memory.json();
    assert_eq!(events.len(), 3);
    for event in &events {
        let top: BTreeSet<&str> = event.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(top, expected_top);
        let mdc: BTreeSet<&str> = event["mdc"].as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(mdc, expected_mdc);
        assert!(event["@timestamp"].as_str().unwrap().ends_with('Z'));
    }

    let cleared = by_message(&events, "after clear")[0];
    for key in &MDC_KEYS[1..] {
        assert_eq!(cleared["mdc"][key], Value::Null, "{key} should be null after clear");
    }
    assert!(cleared["mdc"]["correlationId"].is_string());
}

#[tokio::test]
async fn test_uncorrelated_records_get_fresh_ids() {
    let memory = MemorySink::new();
    let logger = Logger::builder("ids").sink(memory.clone()).build();
    let ctl = ContextController::new();

    ctl.scope(async {
        logger.info("first");
        logger.info("second");
        ctl.set_correlation_id("fixed");
        logger.info("third");
        logger.info("fourth");
    })
    .await;
    logger.flush().await;

    let ids: Vec<String> = memory
        .json()
        .iter()
        .map(|e| e["mdc"]["correlationId"].as_str().unwrap().to_string())
        .collect();
    assert_ne!(ids[0], ids[1]);
    assert_eq!(ids[2], "fixed");
    assert_eq!(ids[3], "fixed");
}

#[tokio::test]
async fn test_failing_network_sink_does_not_affect_console() {
    let console = MemorySink::named("console");
    let network = NetworkSink::new(NetworkSinkConfig::new("127.0.0.1", common::closed_port()));
    let logger = Logger::builder("fanout")
        .sink(network)
        .sink(console.clone())
        .build();

    for i in 0..20 {
        logger.error(format_args!("event {i}"));
    }
    logger.flush().await;

    assert_eq!(console.len(), 20);
    let stats = logger.sink_stats();
    assert_eq!(stats[0].name, "network");
    assert_eq!(stats[0].delivered, 0);
    assert_eq!(stats[0].failed, 20);
    assert_eq!(stats[1].delivered, 20);
}

#[tokio::test]
async fn test_debug_level_requires_debug_flag() {
    let memory = MemorySink::new();
    let (logger, _ctl) = setup_logging_with_console(quiet_config(false), memory.clone()).await;
    logger.log(Level::Debug, "debug detail");
    logger.log(Level::Info, "info detail");
    logger.flush().await;

    let events = memory.json();
    assert!(by_message(&events, "debug detail").is_empty());
    assert_eq!(by_message(&events, "info detail").len(), 1);

    let memory = MemorySink::new();
    let (logger, _ctl) = setup_logging_with_console(quiet_config(true), memory.clone()).await;
    logger.log(Level::Debug, "debug detail");
    logger.flush().await;

    let events = memory.json();
    assert_eq!(by_message(&events, "debug detail").len(), 1);
    assert_eq!(by_message(&events, "debug detail")[0]["level"], "DEBUG");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_do_not_share_context() {
    let memory = MemorySink::new();
    let logger = Logger::builder("concurrent").sink(memory.clone()).build();
    let ctl = ContextController::new();

    let mut handles = Vec::new();
    for i in 0..32 {
        let logger = logger.clone();
        handles.push(tokio::spawn(ctl.scope(async move {
            ctl.set_correlation_id(format!("req-{i}"));
            ctl.set_context([("requestUri", format!("/items/{i}"))]);
            tokio::task::yield_now().await;
            logger.info(format_args!("handled {i}"));
            ctl.clear_context();
        })));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    logger.flush().await;

    let events = memory.json();
    assert_eq!(events.len(), 32);
    for event in &events {
        let message = event["message"].as_str().unwrap();
        let i = message.trim_start_matches("handled ");
        assert_eq!(event["mdc"]["correlationId"], format!("req-{i}"));
        assert_eq!(event["mdc"]["requestUri"], format!("/items/{i}"));
    }
}

#[tokio::test]
async fn test_unscoped_tasks_do_not_leak_context() {
    let memory = MemorySink::new();
    let logger = Logger::builder("unscoped").sink(memory.clone()).build();
    let ctl = ContextController::new();

    let first = tokio::spawn(async move {
        ctl.set_correlation_id("request-A");
        ctl.set_context([("clientIp", "10.0.0.1")]);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    });
    let second = {
        let logger = logger.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            logger.info("from task B");
        })
    };
    first.await.unwrap();
    second.await.unwrap();
    logger.flush().await;

    let events = memory.json();
    let seen = by_message(&events, "from task B");
    assert_eq!(seen.len(), 1);
    assert_ne!(seen[0]["mdc"]["correlationId"], "request-A");
    assert!(seen[0]["mdc"]["clientIp"].is_null());
}

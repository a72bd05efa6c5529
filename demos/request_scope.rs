//! Handle a few simulated ML requests concurrently, each in its own context
//! scope. Start a collector first (e.g. `nc -lk 5001`) to see the network
//! sink; without one, logging falls back to the console.

use std::time::Duration;
use tracing_mdc_sink::request::{RequestInfo, CORRELATION_ID_HEADER};
use tracing_mdc_sink::{setup_logging, ContextController, Level, Logger};

async fn handle_prediction(logger: Logger, ctl: ContextController, request: RequestInfo) {
    let scope = ctl.begin_request(&request);

    logger
        .event(Level::Info, "Processing ML request")
        .field("modelVersion", "v1.0.0")
        .emit();

    tokio::time::sleep(Duration::from_millis(25)).await;

    ctl.finish_request(&scope, 200);
    logger.info("Prediction completed");
    ctl.clear_context();
}

#[tokio::main]
async fn main() {
    let (logger, ctl) = setup_logging("localhost", 5001).await;

    let requests = vec![
        RequestInfo::from_headers(
            "POST",
            "/api/ml/predict",
            [(CORRELATION_ID_HEADER, "demo-1"), ("User-Agent", "curl/8.0")],
            Some("192.0.2.10"),
        ),
        RequestInfo::from_headers(
            "POST",
            "/api/ml/predict",
            [("X-Forwarded-For", "203.0.113.7, 10.0.0.1")],
            Some("10.0.0.1"),
        ),
    ];

    let handles: Vec<_> = requests
        .into_iter()
        .map(|request| {
            tokio::spawn(ctl.scope(handle_prediction(logger.clone(), ctl, request)))
        })
        .collect();
    for handle in handles {
        let _ = handle.await;
    }

    logger.close().await;
}

use std::time::Instant;
use tokio::time::Duration;

use tracing_mdc_sink::noop_sink::NoopSink;
use tracing_mdc_sink::{ContextController, Logger};

#[tokio::main]
async fn main() {
    let logger = Logger::builder("load-test")
        .channel_buffer(50_000)
        .sink(NoopSink)
        .build();
    let ctl = ContextController::new();

    let n: u64 = 100_000;
    let start = Instant::now();

    ctl.scope(async {
        ctl.set_correlation_id("load-test");
        ctl.set_context([("requestMethod", "GET"), ("requestUri", "/load")]);
        for i in 0..n {
            logger.info(format_args!("load test event {i}"));
            if i % 10_000 == 0 {
                tokio::task::yield_now().await;
            }
        }
    })
    .await;

    let elapsed = start.elapsed();
    println!(
        "enqueued {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    tokio::time::timeout(Duration::from_secs(5), logger.flush()).await.ok();
    for stats in logger.sink_stats() {
        println!("{}: delivered {} dropped {}", stats.name, stats.delivered, stats.dropped);
    }
}

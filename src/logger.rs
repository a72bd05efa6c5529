//! The logging facade: level filter, enrichment, serialization and fan-out.
//!
//! Every sink gets its own bounded queue and background task. `log` only
//! performs a `try_send` per sink, so a slow or unreachable sink can never
//! stall the caller or starve the other sinks. When a queue is full the
//! newest event is dropped for that sink and counted.

use crate::enricher::Enricher;
use crate::level::Level;
use crate::record::{format_error_chain, RawEvent, ServiceIdentity};
use crate::serializer::{JsonSerializer, SerializedEvent};
use crate::sink::LogSink;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

/// Target of the crate's own warnings. The tracing bridge ignores it, so
/// diagnostics never re-enter the pipeline.
pub const DIAGNOSTICS_TARGET: &str = "tracing_mdc_sink::diagnostics";

const MIN_CHANNEL_BUFFER: usize = 16;
const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

enum Command {
    Write(SerializedEvent),
    Flush(oneshot::Sender<()>),
    Close(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct SinkCounters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time counters of one sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkStats {
    pub name: String,
    /// Accepted into the sink's queue.
    pub enqueued: u64,
    /// Written successfully by the sink.
    pub delivered: u64,
    /// Rejected by the sink's `write`.
    pub failed: u64,
    /// Never queued because the queue was full or closed.
    pub dropped: u64,
}

struct SinkHandle {
    name: String,
    sender: mpsc::Sender<Command>,
    counters: Arc<SinkCounters>,
    worker: JoinHandle<()>,
}

struct Inner {
    min_level: Level,
    control_timeout: Duration,
    enricher: Enricher,
    serializer: JsonSerializer,
    sinks: Vec<SinkHandle>,
}

/// Entry point used by application code. Cheap to clone.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

/// Builder for [`Logger`].
pub struct LoggerBuilder {
    name: String,
    identity: ServiceIdentity,
    min_level: Level,
    channel_buffer: usize,
    control_timeout: Duration,
    sinks: Vec<Box<dyn LogSink>>,
}

impl LoggerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: ServiceIdentity::default(),
            min_level: Level::Info,
            channel_buffer: 1024,
            control_timeout: DEFAULT_CONTROL_TIMEOUT,
            sinks: Vec::new(),
        }
    }

    pub fn identity(mut self, identity: ServiceIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    /// Capacity of each sink's queue. Values below 16 are raised to 16.
    pub fn channel_buffer(mut self, buffer: usize) -> Self {
        self.channel_buffer = buffer;
        self
    }

    /// How long `flush` and `close` wait on each sink before giving up on it.
    pub fn control_timeout(mut self, control_timeout: Duration) -> Self {
        self.control_timeout = control_timeout;
        self
    }

    /// Register a sink. It is expected to be connected already, or to
    /// connect lazily on its first write.
    pub fn sink(self, sink: impl LogSink + 'static) -> Self {
        self.boxed_sink(Box::new(sink))
    }

    pub fn boxed_sink(mut self, sink: Box<dyn LogSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Spawn one worker per sink and return the logger.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Logger {
        let buffer = self.channel_buffer.max(MIN_CHANNEL_BUFFER);
        let sinks = self
            .sinks
            .into_iter()
            .map(|sink| spawn_worker(sink, buffer))
            .collect();

        Logger {
            inner: Arc::new(Inner {
                min_level: self.min_level,
                control_timeout: self.control_timeout,
                enricher: Enricher::new(self.name, Arc::new(self.identity)),
                serializer: JsonSerializer::new(),
                sinks,
            }),
        }
    }
}

fn spawn_worker(mut sink: Box<dyn LogSink>, buffer: usize) -> SinkHandle {
    let (tx, mut rx) = mpsc::channel::<Command>(buffer);
    let counters = Arc::new(SinkCounters::default());
    let counters_bg = Arc::clone(&counters);
    let name = sink.name().to_string();

    let worker = tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Write(event) => match sink.write(&event).await {
                    Ok(()) => {
                        counters_bg.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        counters_bg.failed.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            target: DIAGNOSTICS_TARGET,
                            sink = sink.name(),
                            error = %e,
                            "log sink write failed"
                        );
                    }
                },
                Command::Flush(ack) => {
                    if let Err(e) = sink.flush().await {
                        tracing::warn!(
                            target: DIAGNOSTICS_TARGET,
                            sink = sink.name(),
                            error = %e,
                            "log sink flush failed"
                        );
                    }
                    let _ = ack.send(());
                }
                Command::Close(ack) => {
                    rx.close();
                    sink.close().await;
                    let _ = ack.send(());
                    return;
                }
            }
        }
        // Every logger handle is gone.
        sink.close().await;
    });

    SinkHandle {
        name,
        sender: tx,
        counters,
        worker,
    }
}

impl Logger {
    pub fn builder(name: impl Into<String>) -> LoggerBuilder {
        LoggerBuilder::new(name)
    }

    /// Value of the `logger` field of every record.
    pub fn name(&self) -> &str {
        self.inner.enricher.logger_name()
    }

    pub fn min_level(&self) -> Level {
        self.inner.min_level
    }

    pub fn identity(&self) -> &ServiceIdentity {
        self.inner.enricher.identity()
    }

    pub fn enabled(&self, level: Level) -> bool {
        level >= self.inner.min_level
    }

    /// Log `message` at `level`.
    ///
    /// The message is rendered immediately. This never blocks on I/O and
    /// never fails; delivery problems are reported on the diagnostics target.
    pub fn log(&self, level: Level, message: impl fmt::Display) {
        if !self.enabled(level) {
            return;
        }
        self.dispatch(RawEvent::new(level, message.to_string()));
    }

    pub fn debug(&self, message: impl fmt::Display) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: impl fmt::Display) {
        self.log(Level::Info, message);
    }

    pub fn warning(&self, message: impl fmt::Display) {
        self.log(Level::Warning, message);
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.log(Level::Error, message);
    }

    pub fn critical(&self, message: impl fmt::Display) {
        self.log(Level::Critical, message);
    }

    /// Start an event that carries per-call fields or an error payload.
    pub fn event(&self, level: Level, message: impl fmt::Display) -> EventBuilder<'_> {
        let raw = self
            .enabled(level)
            .then(|| RawEvent::new(level, message.to_string()));
        EventBuilder { logger: self, raw }
    }

    /// Enrich, serialize and fan out an already-built event.
    pub fn dispatch(&self, raw: RawEvent) {
        if !self.enabled(raw.level) {
            return;
        }

        let record = self.inner.enricher.enrich(raw);
        let event = match self.inner.serializer.serialize(&record) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    target: DIAGNOSTICS_TARGET,
                    error = %e,
                    level = %record.level,
                    "dropping log record that could not be serialized"
                );
                return;
            }
        };

        for sink in &self.inner.sinks {
            match sink.sender.try_send(Command::Write(event.clone())) {
                Ok(()) => {
                    sink.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Full(_)) => {
                    sink.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        target: DIAGNOSTICS_TARGET,
                        sink = %sink.name,
                        "log queue full, dropping event"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    sink.counters.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Wait until every sink has written everything queued before this call,
    /// then flush each sink.
    ///
    /// Sinks that do not answer within the control timeout are skipped and
    /// reported on the diagnostics target.
    pub async fn flush(&self) {
        for sink in self.broadcast(Command::Flush).await {
            tracing::warn!(
                target: DIAGNOSTICS_TARGET,
                sink = %sink.name,
                "log sink did not flush in time"
            );
        }
    }

    /// Flush and close every sink, releasing their connections. Events
    /// logged afterwards are dropped.
    ///
    /// A sink whose worker does not acknowledge within the control timeout
    /// has its worker aborted, which drops the sink and its connection.
    pub async fn close(&self) {
        for sink in self.broadcast(Command::Close).await {
            tracing::warn!(
                target: DIAGNOSTICS_TARGET,
                sink = %sink.name,
                "log sink did not close in time, aborting its worker"
            );
            sink.worker.abort();
        }
    }

    /// Send `command` to every worker and wait for the acks. Returns the
    /// sinks that missed the control timeout.
    async fn broadcast(&self, command: fn(oneshot::Sender<()>) -> Command) -> Vec<&SinkHandle> {
        let limit = self.inner.control_timeout;
        let mut acks = Vec::with_capacity(self.inner.sinks.len());
        let mut stuck = Vec::new();

        for sink in &self.inner.sinks {
            let (tx, rx) = oneshot::channel();
            match timeout(limit, sink.sender.send(command(tx))).await {
                Ok(Ok(())) => acks.push((sink, rx)),
                // Worker already gone.
                Ok(Err(_)) => {}
                Err(_) => stuck.push(sink),
            }
        }
        for (sink, rx) in acks {
            if timeout(limit, rx).await.is_err() {
                stuck.push(sink);
            }
        }
        stuck
    }

    pub fn sink_stats(&self) -> Vec<SinkStats> {
        self.inner
            .sinks
            .iter()
            .map(|sink| SinkStats {
                name: sink.name.clone(),
                enqueued: sink.counters.enqueued.load(Ordering::Relaxed),
                delivered: sink.counters.delivered.load(Ordering::Relaxed),
                failed: sink.counters.failed.load(Ordering::Relaxed),
                dropped: sink.counters.dropped.load(Ordering::Relaxed),
            })
            .collect()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sinks: Vec<&str> = self.inner.sinks.iter().map(|s| s.name.as_str()).collect();
        f.debug_struct("Logger")
            .field("name", &self.name())
            .field("min_level", &self.inner.min_level)
            .field("control_timeout", &self.inner.control_timeout)
            .field("sinks", &sinks)
            .finish()
    }
}

/// Event under construction, see [`Logger::event`].
///
/// All methods are no-ops when the level is below the logger's minimum.
#[must_use = "call `emit` to log the event"]
pub struct EventBuilder<'a> {
    logger: &'a Logger,
    raw: Option<RawEvent>,
}

impl EventBuilder<'_> {
    /// Attach a field to this record only, overriding a context field of the
    /// same name.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Some(raw) = self.raw.as_mut() {
            raw.fields.insert(key.into(), value.into());
        }
        self
    }

    /// Attach `err` and its source chain as the exception payload.
    pub fn exception(mut self, err: &(dyn std::error::Error + 'static)) -> Self {
        if let Some(raw) = self.raw.as_mut() {
            raw.exception = Some(format_error_chain(err));
        }
        self
    }

    /// Attach a pre-formatted exception payload, e.g. a captured backtrace.
    pub fn exception_text(mut self, text: impl Into<String>) -> Self {
        if let Some(raw) = self.raw.as_mut() {
            raw.exception = Some(text.into());
        }
        self
    }

    pub fn emit(self) {
        if let Some(raw) = self.raw {
            self.logger.dispatch(raw);
        }
    }
}

use crate::serializer::SerializedEvent;
use async_trait::async_trait;
use std::io;

/// Connection lifecycle of a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Disconnected,
    Connecting,
    Connected,
    /// The initial connect failed; the sink stays out of rotation until a
    /// later write manages to reconnect.
    Degraded,
}

/// Error returned when a sink cannot establish its transport.
#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error("timed out connecting to {addr}")]
    Timeout { addr: String },

    #[error("failed to connect to {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("network sink support is disabled, cannot reach {addr}")]
    Disabled { addr: String },
}

/// Error returned when a sink fails to deliver one event.
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("sink is not connected")]
    NotConnected,

    #[error("write timed out")]
    Timeout,

    #[error("reconnect failed: {0}")]
    Reconnect(#[source] ConnectError),

    #[error("write failed: {0}")]
    Io(#[from] io::Error),
}

/// Destination for [`SerializedEvent`]s produced by the logger.
///
/// Each sink is owned by exactly one background worker of a
/// [`Logger`](crate::logger::Logger), which is the only caller of these
/// methods, so implementations take `&mut self` and need no locking. Calls
/// never happen on the application thread that emitted the event.
#[async_trait]
pub trait LogSink: Send {
    /// Short name used in diagnostics and statistics.
    fn name(&self) -> &str;

    fn state(&self) -> SinkState;

    /// Establish the underlying transport.
    ///
    /// **Returns**
    /// - `Ok(())` once the sink is ready to accept writes.
    /// - `Err(ConnectError)` if the transport could not be established. The
    ///   sink is left in [`SinkState::Degraded`].
    async fn connect(&mut self) -> Result<(), ConnectError>;

    /// Deliver a single event.
    ///
    /// Failures are reported to the worker, which counts them and moves on
    /// to the next event; they never reach the code that logged the event.
    async fn write(&mut self, event: &SerializedEvent) -> Result<(), WriteError>;

    /// Flush any buffered events. Default implementation is a no-op.
    async fn flush(&mut self) -> Result<(), WriteError> {
        Ok(())
    }

    /// Release the transport. Must be safe to call more than once.
    async fn close(&mut self);
}

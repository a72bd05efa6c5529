use crate::serializer::SerializedEvent;
use crate::sink::{ConnectError, LogSink, SinkState, WriteError};
use async_trait::async_trait;
use tokio::io::{self, AsyncWrite, AsyncWriteExt};

/// Sink that prints one JSON document per line to standard output.
///
/// Writes go through `tokio::io::stdout`, which hands the blocking write to
/// the runtime's blocking pool instead of stalling a worker thread.
pub struct ConsoleSink {
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    state: SinkState,
}

impl ConsoleSink {
    /// Console sink bound to the process's stdout.
    pub fn stdout() -> Self {
        Self::with_writer(io::stdout())
    }

    /// Console sink writing to an arbitrary writer instead of stdout.
    pub fn with_writer(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            writer: Box::new(writer),
            state: SinkState::Connected,
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::stdout()
    }
}

#[async_trait]
impl LogSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn state(&self) -> SinkState {
        self.state
    }

    async fn connect(&mut self) -> Result<(), ConnectError> {
        self.state = SinkState::Connected;
        Ok(())
    }

    async fn write(&mut self, event: &SerializedEvent) -> Result<(), WriteError> {
        let mut line = Vec::with_capacity(event.len() + 1);
        line.extend_from_slice(event.as_bytes());
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), WriteError> {
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.writer.flush().await;
        self.state = SinkState::Disconnected;
    }
}

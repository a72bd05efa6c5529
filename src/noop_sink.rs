use crate::serializer::SerializedEvent;
use crate::sink::{ConnectError, LogSink, SinkState, WriteError};
use async_trait::async_trait;

/// A sink that simply drops all events.
///
/// Useful for measuring the overhead of the pipeline itself without any
/// I/O.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    fn name(&self) -> &str {
        "noop"
    }

    fn state(&self) -> SinkState {
        SinkState::Connected
    }

    async fn connect(&mut self) -> Result<(), ConnectError> {
        Ok(())
    }

    async fn write(&mut self, _event: &SerializedEvent) -> Result<(), WriteError> {
        Ok(())
    }

    async fn close(&mut self) {}
}

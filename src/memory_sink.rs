use crate::serializer::SerializedEvent;
use crate::sink::{ConnectError, LogSink, SinkState, WriteError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Sink that keeps every event in memory.
///
/// Clones share the same buffer: hand one clone to the logger and keep
/// another to inspect what was delivered.
#[derive(Clone)]
pub struct MemorySink {
    name: String,
    events: Arc<Mutex<Vec<SerializedEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::named("memory")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Vec<SerializedEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Delivered events parsed back into JSON values.
    pub fn json(&self) -> Vec<serde_json::Value> {
        self.events()
            .iter()
            .filter_map(|e| serde_json::from_slice(e.as_bytes()).ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> SinkState {
        SinkState::Connected
    }

    async fn connect(&mut self) -> Result<(), ConnectError> {
        Ok(())
    }

    async fn write(&mut self, event: &SerializedEvent) -> Result<(), WriteError> {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
        Ok(())
    }

    async fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_buffer() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();

        writer.write(&SerializedEvent::from(r#"{"x":1}"#.to_string())).await.unwrap();

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.json()[0]["x"], 1);
    }
}

use crate::serializer::SerializedEvent;
use crate::sink::{ConnectError, LogSink, SinkState, WriteError};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration, Instant};

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Configuration for [`NetworkSink`].
#[derive(Clone, Debug)]
pub struct NetworkSinkConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for a single connection attempt.
    pub connect_timeout: Duration,
    /// Upper bound for writing one event.
    pub write_timeout: Duration,
}

impl NetworkSinkConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(1),
        }
    }
}

/// Sink that streams newline-delimited JSON to a collector over a
/// persistent TCP connection.
///
/// After a failed write the connection is dropped and the next write tries
/// to reconnect once. Reconnect attempts are spaced by an exponential
/// backoff (100 ms up to 10 s); writes that arrive inside the backoff window
/// fail immediately with [`WriteError::NotConnected`].
pub struct NetworkSink {
    config: NetworkSinkConfig,
    stream: Option<TcpStream>,
    state: SinkState,
    backoff: Duration,
    retry_at: Option<Instant>,
}

impl NetworkSink {
    pub fn new(config: NetworkSinkConfig) -> Self {
        Self {
            config,
            stream: None,
            state: SinkState::Disconnected,
            backoff: INITIAL_BACKOFF,
            retry_at: None,
        }
    }

    /// `host:port` of the collector.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    fn schedule_retry(&mut self) {
        self.retry_at = Some(Instant::now() + self.backoff);
        self.backoff = std::cmp::min(self.backoff * 2, MAX_BACKOFF);
    }

    fn drop_connection(&mut self) {
        self.stream = None;
        self.state = SinkState::Disconnected;
        self.schedule_retry();
    }

    async fn reconnect(&mut self) -> Result<(), WriteError> {
        if let Some(at) = self.retry_at {
            if Instant::now() < at {
                return Err(WriteError::NotConnected);
            }
        }
        match self.connect().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.schedule_retry();
                Err(WriteError::Reconnect(e))
            }
        }
    }
}

#[async_trait]
impl LogSink for NetworkSink {
    fn name(&self) -> &str {
        "network"
    }

    fn state(&self) -> SinkState {
        self.state
    }

    async fn connect(&mut self) -> Result<(), ConnectError> {
        self.state = SinkState::Connecting;
        let addr = self.addr();

        match timeout(self.config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                self.stream = Some(stream);
                self.state = SinkState::Connected;
                self.backoff = INITIAL_BACKOFF;
                self.retry_at = None;
                Ok(())
            }
            Ok(Err(source)) => {
                self.state = SinkState::Degraded;
                Err(ConnectError::Io { addr, source })
            }
            Err(_) => {
                self.state = SinkState::Degraded;
                Err(ConnectError::Timeout { addr })
            }
        }
    }

    async fn write(&mut self, event: &SerializedEvent) -> Result<(), WriteError> {
        if self.stream.is_none() {
            self.reconnect().await?;
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(WriteError::NotConnected);
        };

        let mut frame = Vec::with_capacity(event.len() + 1);
        frame.extend_from_slice(event.as_bytes());
        frame.push(b'\n');

        match timeout(self.config.write_timeout, stream.write_all(&frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.drop_connection();
                Err(WriteError::Io(e))
            }
            Err(_) => {
                self.drop_connection();
                Err(WriteError::Timeout)
            }
        }
    }

    async fn flush(&mut self) -> Result<(), WriteError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        match timeout(self.config.write_timeout, stream.flush()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.drop_connection();
                Err(WriteError::Io(e))
            }
            Err(_) => {
                self.drop_connection();
                Err(WriteError::Timeout)
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = timeout(self.config.write_timeout, stream.shutdown()).await;
        }
        self.state = SinkState::Disconnected;
    }
}

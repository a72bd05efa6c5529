pub mod level;
pub mod context;
pub mod request;
pub mod record;
pub mod enricher;
pub mod serializer;
pub mod sink;
pub mod console;

#[cfg(feature = "network")]
pub mod network;

pub mod memory_sink;
pub mod noop_sink;
pub mod logger;
pub mod layer;
pub mod env;
pub mod init;

pub use context::{ContextController, LogContext};
pub use init::{setup_logging, setup_logging_with_config, LoggingConfig};
pub use level::Level;
pub use logger::Logger;

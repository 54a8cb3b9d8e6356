//! VSSP relay daemon: receives fragments over UDP, reassembles frames with
//! `vssp_core` and broadcasts each completed frame to WebSocket viewers.

pub mod config;
pub mod error;
pub mod fanout;
pub mod ingest;
pub mod registry;
pub mod sender;
pub mod server;
pub mod stats;

pub use config::Config;
pub use error::{RelayError, Result};
pub use ingest::{bind_ingest_socket, Ingest, Relay, ViewerEvent};
pub use registry::{ViewerChannel, ViewerId, ViewerRegistry, ViewerSink};
pub use stats::{RelayStats, SharedStats};

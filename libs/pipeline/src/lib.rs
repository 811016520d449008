pub mod config;
pub mod error;
mod backoff;
mod bridge;
mod buffer;
mod decode;
mod forwarder;
mod listener;
mod scheduler;

#[cfg(test)]
mod testing;

pub use error::{DecodeError, ForwardError, PipelineError};
pub use backoff::Backoff;
pub use bridge::{Bridge, BridgeReport};
pub use buffer::{Batch, SharedBuffer};
pub use config::{BridgeSettings, FlushConfig, ReconnectConfig, ShutdownConfig, SubscriptionConfig};
pub use decode::decode_payload;
pub use forwarder::{BatchReport, Forwarder};
pub use listener::{Listener, ListenerReport};
pub use scheduler::{FlushScheduler, SchedulerReport};

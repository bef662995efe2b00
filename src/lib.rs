pub mod aggregate;
pub mod config;
pub mod connector;
pub mod diff;
pub mod error;
pub mod event;
pub mod hub;
pub mod logging;
pub mod messages;
pub mod metrics;
pub mod pipeline;
pub mod score;
pub mod server;
pub mod snapshot;
pub mod store;

pub use error::{PulseError, Result};

pub mod config;
pub mod error;
pub mod types;

pub use config::BridgeConfig;
pub use error::{MacroError, Result};
pub use types::{SessionId, Timestamp};

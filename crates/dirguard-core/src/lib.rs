pub mod anomaly;
pub mod error;
pub mod metadata;
pub mod retention;
pub mod settings;
pub mod snapshot;
pub mod walker;

pub use error::{MonitorError, Result};

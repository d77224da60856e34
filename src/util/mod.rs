//! Shared utilities.

pub mod retry;
pub mod serde;
pub mod signal;
pub mod telemetry;

pub use retry::{retry, retry_async};
pub use signal::shutdown_signal;
pub use telemetry::init_tracing;

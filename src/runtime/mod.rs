//! HTTP surface and process-level adapters.

pub mod command_handler;

#[cfg(feature = "http")]
pub mod api;
#[cfg(feature = "http")]
pub mod http_client;

pub use command_handler::CommandHandler;

#[cfg(feature = "http")]
pub use api::router;
#[cfg(feature = "http")]
pub use http_client::HttpSchedulerClient;

//! # Agora Server
//!
//! HTTP front end for the Agora request gateway.
//!
//! - HTTP/1.1 via hyper, one task per connection
//! - Peer address passed to the gateway as the client IP
//! - Operational endpoints under `/_gateway/` (metrics, health, breakers, Prometheus)
//! - Graceful shutdown on SIGTERM / SIGINT
//!
//! ## Example
//!
//! ```rust,ignore
//! use agora::Gateway;
//! use agora_server::{GatewayServer, ShutdownSignal};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let gateway = Arc::new(Gateway::builder().build()?);
//!     let tasks = gateway.start_background_tasks();
//!
//!     GatewayServer::new(Arc::clone(&gateway))
//!         .run_with_shutdown(ShutdownSignal::with_os_signals()?)
//!         .await?;
//!
//!     tasks.stop().await;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/agora-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod ops;
pub mod server;
pub mod shutdown;

pub use error::{ServerError, ServerResult};
pub use server::{GatewayServer, HttpResponse, ResponseBody};
pub use shutdown::ShutdownSignal;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

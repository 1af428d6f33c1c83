//! # downlog-server
//!
//! HTTP front end of downlog: each log category is one POST endpoint that
//! answers with a streamed zip archive of the selected files.
//!
//! ## Example
//!
//! ```rust,no_run
//! use downlog_server::{LogServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default().with_api_prefix("/downlog/node01");
//!     let server = LogServer::new(config);
//!     // server.serve().await.unwrap();
//! }
//! ```
//!
//! ## API Endpoints
//!
//! | Endpoint | Method | Body |
//! |----------|--------|------|
//! | `{prefix}/api/catalina` | POST | `{"timestamp": "<RFC3339>"}` |
//! | `{prefix}/api/universe` | POST | `{"timestamp": "<RFC3339>"}` |
//! | `{prefix}/api/alltomcat` | POST | `{"timestamp": "<RFC3339>"}` |
//! | `{prefix}/api/scaners` | POST | `{"scanid": "<id>"}` |
//! | `{prefix}/api/health` | GET | - |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;
pub mod stream;

// Re-export main types
pub use config::{Cli, ServerConfig, TlsConfig};
pub use error::{ApiError, ServerError, ServerResult};
pub use server::LogServer;
pub use state::AppState;

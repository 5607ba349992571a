//! # tsu-trace
//!
//! Trace-ID middleware for HTTP services: every request gets a correlation
//! identifier, carried in a header, and two JSON access log lines.
//!
//! ## What it does per request
//!
//! - Reuses the ID from the `X-Trace-Id` header (name configurable), or
//!   generates a 128-bit random hex ID and writes it into the request headers
//! - Makes it available to handlers as [`Request::trace_id`]
//! - Echoes it back in the response header
//! - Writes a start line and a completion line (with `response_time` and
//!   `status`) to a [`LogSink`], stdout by default
//!
//! What it does not do: spans, sampling, parent/child propagation, shipping
//! logs anywhere. The log lines are the product; collect them with whatever
//! already tails your stdout.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tsu_trace::{Config, Request, Response, Server, middleware::TraceMiddleware};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tsu_trace::Error> {
//!     let config = Config::from_json(r#"{"headerName":"X-Trace-Id"}"#)?;
//!     let app = TraceMiddleware::new(&config, "trace", health)?;
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! async fn health(req: Request) -> Response {
//!     let id = req.trace_id().unwrap_or("none");
//!     Response::json(format!(r#"{{"status":"ok","trace_id":"{id}"}}"#))
//! }
//! ```
//!
//! The crate's own diagnostics (listening, accept errors, random-source
//! fallback) go through [`tracing`]; install a subscriber that writes to
//! stderr to keep them apart from the access log on stdout.

mod config;
mod error;
mod handler;
mod request;
mod response;
mod server;
mod trace_id;

pub mod access_log;
pub mod middleware;

pub use access_log::{LogRecord, LogSink, MemorySink, StdoutSink};
pub use config::{Config, DEFAULT_HEADER_NAME};
pub use error::Error;
pub use handler::Handler;
pub use middleware::TraceMiddleware;
pub use request::Request;
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use server::Server;
pub use trace_id::{TRACE_ID_KEY, TraceId};

//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns. A middleware owns the next [`Handler`](crate::Handler)
//! and is a `Handler` itself, so layers nest by construction.
//!
//! Built-in middleware:
//! - [`trace`]: per-request trace ID, propagated through headers, with JSON
//!   start/completion access log lines

pub mod trace;

pub use trace::TraceMiddleware;

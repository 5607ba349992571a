//! Trace ID middleware.
//!
//! For every request:
//!
//! 1. reuse the trace ID from the configured header, or generate one and
//!    write it into the request headers so downstream sees it
//! 2. attach it to the request extensions ([`Request::trace_id`])
//! 3. log a start line, call the next handler, log a completion line with
//!    `response_time` and `status`
//! 4. echo the ID in the response header unless downstream already set it
//!
//! The completion line is emitted from a drop guard, so a panicking
//! downstream still gets one (with `"status":"error"`) while the panic keeps
//! unwinding to the host.
//!
//! ```rust,no_run
//! use tsu_trace::{Config, Request, Server, middleware::TraceMiddleware};
//!
//! # async fn run() -> Result<(), tsu_trace::Error> {
//! let app = TraceMiddleware::new(&Config::default(), "trace", hello)?;
//! Server::bind("0.0.0.0:3000")?.serve(app).await
//! # }
//! async fn hello(req: Request) -> String {
//!     format!("your trace id is {}", req.trace_id().unwrap_or_default())
//! }
//! ```

use std::sync::Arc;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use http::header::{HeaderName, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::access_log::{LogRecord, LogSink, StdoutSink};
use crate::config::Config;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler};
use crate::request::Request;
use crate::response::Response;
use crate::trace_id::{TRACE_ID_KEY, TraceId};

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Wraps a downstream handler with trace ID propagation and access logging.
///
/// Cheap to clone: every field is shared.
#[derive(Clone)]
pub struct TraceMiddleware {
    next: BoxedHandler,
    name: Arc<str>,
    header: HeaderName,
    sink: Arc<dyn LogSink>,
}

impl TraceMiddleware {
    /// Builds the middleware around `next`.
    ///
    /// An empty header name in `config` means `X-Trace-Id`. Fails only if the
    /// header name is not a legal HTTP field name. `name` identifies this
    /// instance in diagnostics.
    pub fn new(config: &Config, name: &str, next: impl Handler) -> Result<Self, Error> {
        Ok(Self {
            next: next.into_boxed_handler(),
            name: Arc::from(name),
            header: config.header()?,
            sink: Arc::new(StdoutSink),
        })
    }

    /// Replaces the default stdout sink.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn header_name(&self) -> &HeaderName { &self.header }

    /// Runs one request through the middleware and the downstream handler.
    pub async fn handle(&self, mut req: Request) -> Response {
        let started = Instant::now();
        let start_time = timestamp();

        // Any present, non-empty value is reused byte for byte.
        let upstream = req.headers().get(&self.header).filter(|v| !v.is_empty()).cloned();
        let (trace_id, header_value) = match upstream {
            Some(value) => {
                let id = TraceId::from(String::from_utf8_lossy(value.as_bytes()).into_owned());
                (id, Some(value))
            }
            None => {
                let id = TraceId::generate();
                debug!(middleware = %self.name, trace_id = %id, "generated trace id");
                let value = HeaderValue::from_str(id.as_str()).ok();
                if let Some(value) = &value {
                    req.headers_mut().insert(self.header.clone(), value.clone());
                }
                (id, value)
            }
        };
        req.extensions_mut().insert(trace_id.clone());

        let fields = request_fields(&req, &trace_id);
        self.sink.emit(&fields.clone().field("timestamp", start_time));

        let completion = Completion {
            fields: Some(fields),
            started,
            sink: Arc::clone(&self.sink),
        };
        let mut res = self.next.call(req).await;
        completion.finish(Outcome::Ok);

        if let Some(value) = header_value {
            if !res.headers().contains_key(&self.header) {
                res.headers_mut().insert(self.header.clone(), value);
            }
        }
        res
    }
}

impl ErasedHandler for TraceMiddleware {
    fn call(&self, req: Request) -> BoxFuture {
        let this = self.clone();
        Box::pin(async move { this.handle(req).await })
    }
}

/// Fields shared by the start and completion lines, in output order.
fn request_fields(req: &Request, trace_id: &TraceId) -> LogRecord {
    LogRecord::new()
        .field(TRACE_ID_KEY, trace_id.as_str())
        .field("method", req.method().as_str())
        .field("path", req.path())
        .field("remote_addr", req.remote_addr().map(|a| a.to_string()).unwrap_or_default())
        .field("user_agent", req.header_lossy(USER_AGENT.as_str()).unwrap_or_default())
        .field("x_forwarded_for", req.header_lossy(X_FORWARDED_FOR).unwrap_or_default())
}

/// RFC 3339, UTC, nanosecond precision.
fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[derive(Clone, Copy)]
enum Outcome {
    Ok,
    Error,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Emits the completion line exactly once: from [`finish`](Self::finish) when
/// downstream returns, or from `Drop` when it unwinds or is cancelled.
struct Completion {
    fields: Option<LogRecord>,
    started: Instant,
    sink: Arc<dyn LogSink>,
}

impl Completion {
    fn finish(mut self, outcome: Outcome) {
        self.emit(outcome);
    }

    fn emit(&mut self, outcome: Outcome) {
        let Some(fields) = self.fields.take() else { return };
        let elapsed_ms = self.started.elapsed().as_millis();
        self.sink.emit(
            &fields
                .field("timestamp", timestamp())
                .field("response_time", format!("{elapsed_ms} ms"))
                .field("status", outcome.as_str()),
        );
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        self.emit(Outcome::Error);
    }
}

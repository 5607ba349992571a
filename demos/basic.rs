//! Minimal tsu-trace example: one handler behind the trace middleware.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Optional environment:
//!   BIND_ADDR          listen address        (default 0.0.0.0:3000)
//!   TRACE_HEADER_NAME  trace header override (default X-Trace-Id)
//!
//! Try:
//!   curl -i http://localhost:3000/health
//!   curl -i -H 'X-Trace-Id: abc123' http://localhost:3000/health
//!
//! Access log lines go to stdout, diagnostics to stderr.

use http::StatusCode;
use tracing_subscriber::EnvFilter;
use tsu_trace::{Config, Request, Response, Server, TraceMiddleware};

#[tokio::main]
async fn main() -> Result<(), tsu_trace::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::new(std::env::var("TRACE_HEADER_NAME").unwrap_or_default());
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_owned());

    let app = TraceMiddleware::new(&config, "trace", route)?;

    Server::bind(&addr)?.serve(app).await
}

// GET /health → {"status":"ok","trace_id":"…"}
// anything else → 404
//
// Routing is the application's business; the middleware sits in front of it.
async fn route(req: Request) -> Response {
    if req.method() != http::Method::GET || req.path() != "/health" {
        return Response::status(StatusCode::NOT_FOUND);
    }

    let body = serde_json::json!({
        "status": "ok",
        "trace_id": req.trace_id().unwrap_or_default(),
    });
    Response::json(body.to_string())
}

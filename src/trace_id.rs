//! Trace ID value and generation.
//!
//! A fresh ID is 16 bytes from the OS CSPRNG, lowercase hex encoded
//! (32 chars). If the OS source errors, generation degrades to
//! `trace-<unix-nanos>` rather than failing the request.

use std::fmt;

use chrono::Utc;
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::warn;

/// Name of the trace ID in log records.
pub const TRACE_ID_KEY: &str = "trace_id";

/// The correlation identifier of one request.
///
/// Stored in the request's extensions by
/// [`TraceMiddleware`](crate::middleware::TraceMiddleware); read it back with
/// [`Request::trace_id`](crate::Request::trace_id).
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct TraceId(String);

impl TraceId {
    /// Generates a new ID from the OS random source.
    pub fn generate() -> Self {
        Self::generate_with(&mut OsRng)
    }

    /// Generates a new ID from `rng`, falling back to a timestamp ID if it
    /// reports an error.
    pub fn generate_with<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 16];
        match rng.try_fill_bytes(&mut bytes) {
            Ok(()) => Self(hex::encode(bytes)),
            Err(e) => {
                warn!(error = %e, "random source failed, using timestamp trace id");
                Self::from_timestamp()
            }
        }
    }

    fn from_timestamp() -> Self {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        Self(format!("trace-{nanos}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TraceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TraceId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

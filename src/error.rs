//! Unified error type.

/// The error type returned by the crate's fallible operations.
///
/// Request-level outcomes are expressed as [`Response`](crate::Response)
/// values, not as `Error`s. This type surfaces setup and infrastructure
/// failures: a bad config, a bad header name, binding or accepting a
/// connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    #[error("invalid header name `{name}`: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },

    #[error("config: {0}")]
    Config(#[from] serde_json::Error),
}

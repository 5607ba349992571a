//! Middleware configuration.
//!
//! One knob: the header that carries the trace ID. The host hands it over as
//! JSON (`{"headerName": "X-Request-Id"}`); anything missing or empty falls
//! back to [`DEFAULT_HEADER_NAME`].

use http::HeaderName;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Header used when the config leaves `headerName` unset or empty.
pub const DEFAULT_HEADER_NAME: &str = "X-Trace-Id";

/// Trace middleware configuration.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub header_name: String,
}

impl Config {
    pub fn new(header_name: impl Into<String>) -> Self {
        Self { header_name: header_name.into() }
    }

    /// Parses the host's JSON plugin config.
    ///
    /// ```rust
    /// use tsu_trace::Config;
    ///
    /// let config = Config::from_json(r#"{"headerName":"X-Request-Id"}"#).unwrap();
    /// assert_eq!(config.resolved_header_name(), "X-Request-Id");
    /// ```
    pub fn from_json(raw: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(raw)?)
    }

    /// The header name actually in effect. Empty means default.
    pub fn resolved_header_name(&self) -> &str {
        if self.header_name.is_empty() {
            DEFAULT_HEADER_NAME
        } else {
            &self.header_name
        }
    }

    /// Validates [`resolved_header_name`](Self::resolved_header_name) as an
    /// HTTP field name.
    pub(crate) fn header(&self) -> Result<HeaderName, Error> {
        let name = self.resolved_header_name();
        HeaderName::from_bytes(name.as_bytes()).map_err(|source| Error::InvalidHeaderName {
            name: name.to_owned(),
            source,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_HEADER_NAME)
    }
}

//! Incoming HTTP request type.

use std::borrow::Cow;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{Extensions, HeaderMap, Method};

use crate::trace_id::TraceId;

/// An incoming HTTP request with its body already collected.
///
/// Wraps an [`http::Request`] and adds the peer address the hosting server
/// accepted it from.
pub struct Request {
    inner: http::Request<Bytes>,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    pub fn new(inner: http::Request<Bytes>) -> Self {
        Self { inner, remote_addr: None }
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn method(&self) -> &Method { self.inner.method() }

    /// The request path exactly as it appeared on the wire. Percent-escapes
    /// are kept (`/a%20b` stays `/a%20b`), and the query string is excluded.
    pub fn path(&self) -> &str { self.inner.uri().path() }

    pub fn headers(&self) -> &HeaderMap { self.inner.headers() }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { self.inner.headers_mut() }
    pub fn body(&self) -> &Bytes { self.inner.body() }
    pub fn extensions(&self) -> &Extensions { self.inner.extensions() }
    pub fn extensions_mut(&mut self) -> &mut Extensions { self.inner.extensions_mut() }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Case-insensitive header lookup. Values that are not visible ASCII
    /// read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers().get(name)?.to_str().ok()
    }

    /// Case-insensitive header lookup that never drops a present value:
    /// bytes that are not valid UTF-8 are replaced with `U+FFFD`.
    pub fn header_lossy(&self, name: &str) -> Option<Cow<'_, str>> {
        let value = self.inner.headers().get(name)?;
        Some(String::from_utf8_lossy(value.as_bytes()))
    }

    /// The trace ID attached by [`TraceMiddleware`](crate::middleware::TraceMiddleware),
    /// if the request went through it.
    pub fn trace_id(&self) -> Option<&str> {
        self.inner.extensions().get::<TraceId>().map(TraceId::as_str)
    }

    pub fn into_inner(self) -> http::Request<Bytes> {
        self.inner
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(inner: http::Request<Bytes>) -> Self {
        Self::new(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let req = Request::new(
            http::Request::get("/users")
                .header("User-Agent", "curl/8.5")
                .body(Bytes::new())
                .unwrap(),
        );
        assert_eq!(req.header("user-agent"), Some("curl/8.5"));
        assert_eq!(req.header("USER-AGENT"), Some("curl/8.5"));
        assert_eq!(req.header("x-forwarded-for"), None);
    }

    #[test]
    fn non_text_header_reads_as_absent() {
        let mut req = Request::new(http::Request::get("/").body(Bytes::new()).unwrap());
        req.headers_mut().insert(
            "x-trace-id",
            http::HeaderValue::from_bytes(b"\xffbad").unwrap(),
        );
        assert_eq!(req.header("x-trace-id"), None);
    }

    #[test]
    fn lossy_lookup_keeps_utf8_values() {
        let mut req = Request::new(http::Request::get("/").body(Bytes::new()).unwrap());
        req.headers_mut().insert(
            "user-agent",
            http::HeaderValue::from_bytes("café/1.0".as_bytes()).unwrap(),
        );
        assert_eq!(req.header("user-agent"), None);
        assert_eq!(req.header_lossy("user-agent").as_deref(), Some("café/1.0"));
        assert_eq!(req.header_lossy("x-forwarded-for"), None);
    }

    #[test]
    fn path_keeps_percent_escapes() {
        let req = Request::new(http::Request::get("/files/a%20b").body(Bytes::new()).unwrap());
        assert_eq!(req.path(), "/files/a%20b");
    }

    #[test]
    fn trace_id_reads_extension() {
        let mut req = Request::new(http::Request::get("/").body(Bytes::new()).unwrap());
        assert_eq!(req.trace_id(), None);
        req.extensions_mut().insert(TraceId::from("abc123"));
        assert_eq!(req.trace_id(), Some("abc123"));
    }

    #[test]
    fn path_excludes_query() {
        let req = Request::new(http::Request::get("/search?q=1").body(Bytes::new()).unwrap())
            .with_remote_addr("10.0.0.1:4000".parse().unwrap());
        assert_eq!(req.path(), "/search");
        assert_eq!(req.remote_addr().unwrap().to_string(), "10.0.0.1:4000");
    }
}

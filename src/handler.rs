//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! The middleware and the server both hold "the next thing to call" without
//! knowing its concrete type, so handlers are kept as trait objects
//! (`dyn ErasedHandler`) behind an `Arc`.
//!
//! ```text
//! async fn hello(req: Request) -> Response { … }   ← user writes this
//!        ↓ TraceMiddleware::new(&config, "trace", hello)
//! hello.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                       ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(req)  at request time               ← one vtable dispatch
//!        ↓
//! Box::pin(async { hello(req).await.into_response() })  ← BoxFuture
//! ```
//!
//! The only runtime cost per request is **one Arc clone** (atomic inc) +
//! **one virtual call**. Both are negligible next to network I/O.
//!
//! [`TraceMiddleware`] is itself a [`Handler`], so it can be handed straight
//! to [`Server::serve`](crate::Server::serve) or wrapped again. Its
//! `ErasedHandler::call` clones the middleware (three `Arc`s and a header
//! name) into the returned future, which keeps that future `'static`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::middleware::TraceMiddleware;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future that resolves to a [`Response`].
///
/// `Pin<Box<…>>` is required because the runtime polls the future in place
/// and must not move it after the first poll. `Send + 'static` let tokio move
/// the future across worker threads, which is what lets the server run one
/// task per connection.
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` rather than `pub(crate)` because it appears in the
/// return type of the public `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
///
/// `#[doc(hidden)] pub` for the same reason as `ErasedHandler`. `Arc` gives
/// cheap, thread-safe shared ownership: the server clones it once per
/// connection, and a middleware keeps one for its downstream.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid downstream handler.
///
/// Satisfied automatically for any `async fn` (or closure returning a future)
/// with the shape:
///
/// ```text
/// async fn name(req: Request) -> impl IntoResponse
/// ```
///
/// and for [`TraceMiddleware`]. The trait is sealed: nothing outside this
/// crate can implement it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// The sealing module. Because `Sealed` is private, external crates cannot
/// name it and therefore cannot implement `Handler` on their own types.
mod private {
    pub trait Sealed {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

/// Seal any function with the right signature.
///
/// `Fn(Request) -> Fut` covers:
///   - named `async fn` items
///   - closures returning an `async` block
///   - any struct that implements `Fn`
impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

/// Implement `Handler` for any function with the right signature.
impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

// ── Middleware ────────────────────────────────────────────────────────────────

/// A middleware already implements [`ErasedHandler`] itself, so boxing it is
/// a plain `Arc::new`: no `FnHandler` wrapper and no extra future layer.
impl private::Sealed for TraceMiddleware {}

impl Handler for TraceMiddleware {
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(self)
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Newtype wrapper that holds a concrete handler `F` and implements
/// [`ErasedHandler`], bridging the typed world to the trait-object world.
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        // Calling the wrapped function yields the concrete `Fut`; map its
        // output through `IntoResponse` and box it to match the trait.
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::*;

    async fn teapot(_req: Request) -> StatusCode {
        StatusCode::IM_A_TEAPOT
    }

    #[tokio::test]
    async fn async_fn_is_a_handler() {
        let handler = teapot.into_boxed_handler();
        let req = Request::new(http::Request::get("/").body(Bytes::new()).unwrap());
        let res = handler.call(req).await;
        assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn closure_is_a_handler() {
        let handler = (|req: Request| async move { req.path().to_owned() }).into_boxed_handler();
        let req = Request::new(http::Request::get("/echo").body(Bytes::new()).unwrap());
        let res = handler.call(req).await;
        assert_eq!(res.body().as_ref(), b"/echo");
    }

    #[tokio::test]
    async fn boxed_middleware_dispatches_to_downstream() {
        let sink = Arc::new(crate::access_log::MemorySink::new());
        let handler = TraceMiddleware::new(&crate::Config::default(), "boxed", teapot)
            .unwrap()
            .with_sink(sink.clone())
            .into_boxed_handler();
        let req = Request::new(http::Request::get("/").body(Bytes::new()).unwrap());
        let res = handler.call(req).await;
        assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
        assert!(res.headers().contains_key("x-trace-id"));
        assert_eq!(sink.lines().len(), 2);
    }
}

//! Request and handler capability contracts.
//!
//! Application types take part in dispatch by implementing these traits:
//!
//! - [`Request`] - "is a request expecting response `R`"
//! - [`Notification`] - "is a completion-only request" (response is `()`)
//! - [`RequestHandler`] - "is a handler of request type `Q` producing `Q::Response`"
//!
//! A notification handler is a [`RequestHandler`] for a [`Notification`] type,
//! so there is a single handler contract for both dispatch styles.
//!
//! # Example
//!
//! ```
//! use observr_core::request::{Request, RequestHandler, Response};
//! use observr_core::response;
//!
//! struct Mic {
//!     count: u32,
//! }
//!
//! struct Check {
//!     message: String,
//! }
//!
//! impl Request for Mic {
//!     type Response = Check;
//! }
//!
//! struct MicHandler;
//!
//! impl RequestHandler<Mic> for MicHandler {
//!     fn handle(&self, request: Mic) -> Response<Check> {
//!         response::ready(Check {
//!             message: format!("Mic Check {} {}", request.count, request.count + 1),
//!         })
//!     }
//! }
//! ```

use std::future::Future;
use std::pin::Pin;

/// Asynchronous result of a handler invocation.
///
/// A boxed, `Send` future resolving to the handler's response or the
/// handler's own failure. Futures are cold: nothing a handler deferred into
/// the future runs until it is polled.
///
/// The explicit `Pin<Box<dyn Future>>` (instead of `async fn` in traits)
/// keeps [`RequestHandler`] usable as `Arc<dyn RequestHandler<Q>>`.
pub type Response<R> = Pin<Box<dyn Future<Output = anyhow::Result<R>> + Send>>;

/// A request expecting a response of type [`Request::Response`].
///
/// The response type is carried by the request's type, not by a field. Since
/// it is an associated type, a request type expects exactly one response type.
pub trait Request: Send + 'static {
    /// The response produced by this request's handler.
    type Response: Send + 'static;
}

/// A completion-only request that may be fanned out to many handlers.
///
/// Implemented automatically for every [`Request`] whose response is `()`
/// and which can be cloned, since each handler receives its own copy.
pub trait Notification: Request<Response = ()> + Clone {}

impl<T> Notification for T where T: Request<Response = ()> + Clone {}

/// A handler of request type `Q`.
///
/// Handlers are owned by the handler factory. The dispatcher borrows one for
/// the duration of a single invocation.
///
/// # Dyn Compatibility
///
/// `handle` returns a boxed future so handlers can be stored and resolved as
/// `Arc<dyn RequestHandler<Q>>`.
pub trait RequestHandler<Q: Request>: Send + Sync + 'static {
    /// Handle the given request.
    ///
    /// Work performed directly in this method runs when the dispatcher invokes
    /// the handler; work placed inside the returned future runs when it is polled.
    fn handle(&self, request: Q) -> Response<Q::Response>;
}

impl<Q, F> RequestHandler<Q> for F
where
    Q: Request,
    F: Fn(Q) -> Response<Q::Response> + Send + Sync + 'static,
{
    fn handle(&self, request: Q) -> Response<Q::Response> {
        self(request)
    }
}

//! Constructors for [`Response`] values.
//!
//! Handlers return boxed futures. These helpers cover the common shapes so
//! handler bodies stay short.

use crate::request::Response;
use std::future::Future;

/// A response that resolves immediately to `value`.
#[must_use]
pub fn ready<R: Send + 'static>(value: R) -> Response<R> {
    Box::pin(futures::future::ready(Ok(value)))
}

/// A response that resolves immediately to `error`.
#[must_use]
pub fn fail<R: Send + 'static>(error: impl Into<anyhow::Error>) -> Response<R> {
    Box::pin(futures::future::ready(Err(error.into())))
}

/// Box an async computation as a response.
///
/// ```
/// use observr_core::response;
///
/// let response = response::from_future(async { Ok::<_, anyhow::Error>(42) });
/// # let _ = response;
/// ```
#[must_use]
pub fn from_future<R, F>(future: F) -> Response<R>
where
    F: Future<Output = anyhow::Result<R>> + Send + 'static,
{
    Box::pin(future)
}

/// The completion marker returned by fan-out dispatch.
#[must_use]
pub fn completed() -> Response<()> {
    ready(())
}

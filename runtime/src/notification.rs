//! Notification-invocation wrapper.
//!
//! One wrapper per concrete notification type `N`. It resolves every handler
//! registered for `N`, turns each into a [`HandlerInvocation`], and lets the
//! configured [`PublishStrategy`] run them.
//!
//! # Starting handlers
//!
//! Futures do nothing until polled, so a handler whose future is merely
//! constructed never runs. Invoking a [`HandlerInvocation`] therefore polls
//! the handler's future once, in the caller's context:
//!
//! - `Ready(Ok)`: the handler is done
//! - `Ready(Err)`: the handler failed while starting; reported to the strategy
//! - `Pending`: the remainder is detached per [`DetachPolicy`]
//!
//! The handler's own result is not forwarded. Publish resolves to a single
//! completion marker once every handler has been started.
//!
//! Detached handlers run on the caller's tokio runtime when there is one.
//! Otherwise they share one lazily started `observr-detached` runtime with a
//! single worker. A late error or panic is logged and counted under
//! `observr_handler_failures_total{phase="detached"}`.

use crate::catalog::{RequestWrapperFactory, request_wrapper};
use crate::config::DetachPolicy;
use crate::metrics::DispatchMetrics;
use crate::publish::PublishStrategy;
use crate::wrapper::ErasedValue;
use futures::FutureExt;
use observr_core::{
    DispatchError, HandlerFactory, HandlerFactoryExt, Notification, Response, response,
};
use std::any::{Any, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::OnceLock;
use std::task::{Context, Poll};
use std::time::Instant;

/// One notification handler, ready to be started.
pub struct HandlerInvocation {
    notification_type: &'static str,
    position: usize,
    run: Box<dyn FnOnce() -> Result<(), DispatchError> + Send>,
}

impl HandlerInvocation {
    /// Build an invocation from an arbitrary thunk.
    ///
    /// Used by custom strategies and tests; the dispatcher builds its own.
    #[must_use]
    pub fn from_fn(
        notification_type: &'static str,
        position: usize,
        run: impl FnOnce() -> Result<(), DispatchError> + Send + 'static,
    ) -> Self {
        Self {
            notification_type,
            position,
            run: Box::new(run),
        }
    }

    /// Start the handler.
    ///
    /// # Errors
    ///
    /// [`DispatchError::HandlerFailed`] when the handler fails before its
    /// first suspension point.
    pub fn invoke(self) -> Result<(), DispatchError> {
        (self.run)()
    }

    /// Concrete notification type.
    #[must_use]
    pub const fn notification_type(&self) -> &'static str {
        self.notification_type
    }

    /// Index of the handler in the factory's collection.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }
}

impl fmt::Debug for HandlerInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerInvocation")
            .field("notification_type", &self.notification_type)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

/// Poll `response` once and detach it if it is still pending.
fn start(
    mut response: Response<()>,
    notification_type: &'static str,
    policy: DetachPolicy,
) -> Result<(), DispatchError> {
    let mut cx = Context::from_waker(futures::task::noop_waker_ref());
    match response.as_mut().poll(&mut cx) {
        Poll::Ready(Ok(())) => Ok(()),
        Poll::Ready(Err(source)) => Err(DispatchError::HandlerFailed {
            request_type: notification_type,
            source,
        }),
        Poll::Pending => {
            detach(response, notification_type, policy);
            Ok(())
        },
    }
}

fn detach(response: Response<()>, notification_type: &'static str, policy: DetachPolicy) {
    match policy {
        DetachPolicy::Spawn => {
            let task = async move {
                match AssertUnwindSafe(response).catch_unwind().await {
                    Ok(Ok(())) => {},
                    Ok(Err(error)) => {
                        DispatchMetrics::record_handler_failure("detached");
                        tracing::error!(
                            notification = notification_type,
                            error = %error,
                            "Detached notification handler failed"
                        );
                    },
                    Err(panic) => {
                        DispatchMetrics::record_handler_failure("detached");
                        tracing::error!(
                            notification = notification_type,
                            panic = panic_message(&*panic),
                            "Detached notification handler panicked"
                        );
                    },
                }
            };

            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(task);
            } else if let Some(runtime) = detached_runtime() {
                runtime.spawn(task);
            } else {
                DispatchMetrics::record_handler_failure("detached");
                tracing::error!(
                    notification = notification_type,
                    "No executor for pending notification handler, dropping it"
                );
            }
        },
        DetachPolicy::Abandon => {
            tracing::debug!(
                notification = notification_type,
                "Abandoning pending notification handler after first poll"
            );
            drop(response);
        },
    }
}

/// Shared executor for handlers detached outside any tokio runtime.
///
/// Built on first use; `None` if the runtime could not be started.
fn detached_runtime() -> Option<&'static tokio::runtime::Runtime> {
    static RUNTIME: OnceLock<Option<tokio::runtime::Runtime>> = OnceLock::new();

    RUNTIME
        .get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("observr-detached")
                .enable_all()
                .build()
                .inspect_err(|error| {
                    tracing::error!(
                        error = %error,
                        "Could not start executor for detached notification handlers"
                    );
                })
                .ok()
        })
        .as_ref()
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Type-erased view of a [`NotificationHandlerWrapper`].
pub trait ErasedNotificationWrapper: Send + Sync {
    /// Publish a type-erased notification.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidArgument`] when `notification` is not of this
    ///   wrapper's type
    /// - [`DispatchError::HandlerConstructionFailed`] when the factory fails
    /// - whatever the strategy reports for failing handlers
    fn handle_erased(
        &self,
        notification: ErasedValue,
        factory: &dyn HandlerFactory,
        strategy: &dyn PublishStrategy,
        policy: DetachPolicy,
    ) -> Result<Response<()>, DispatchError>;

    /// Concrete notification type this wrapper serves.
    fn notification_type(&self) -> &'static str;

    /// Constructor of the request wrapper for the same type.
    ///
    /// A notification is also a request, so a published type can be sent.
    fn request_factory(&self) -> RequestWrapperFactory;

    /// Access to the concrete wrapper for typed dispatch.
    fn as_any(&self) -> &dyn Any;
}

/// Fan-out wrapper for notification type `N`.
pub struct NotificationHandlerWrapper<N> {
    _notification: PhantomData<fn() -> N>,
}

impl<N: Notification> NotificationHandlerWrapper<N> {
    /// Create the wrapper.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _notification: PhantomData,
        }
    }

    /// Resolve all handlers for `N` and run them through `strategy`.
    ///
    /// Zero handlers is a valid, silent no-op.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::HandlerConstructionFailed`] when the factory fails
    /// - whatever the strategy reports for failing handlers
    pub fn handle(
        &self,
        notification: N,
        factory: &dyn HandlerFactory,
        strategy: &dyn PublishStrategy,
        policy: DetachPolicy,
    ) -> Result<Response<()>, DispatchError> {
        let notification_type = type_name::<N>();

        let started = Instant::now();
        let handlers = factory.get_handlers::<N>().inspect_err(|_| {
            DispatchMetrics::record_resolve_error("construction");
        })?;
        DispatchMetrics::record_resolve(started.elapsed());
        DispatchMetrics::record_fan_out(handlers.len());

        tracing::trace!(
            notification = notification_type,
            handlers = handlers.len(),
            strategy = strategy.name(),
            "Fanning out notification"
        );

        let invocations = handlers
            .into_iter()
            .enumerate()
            .map(|(position, handler)| {
                let notification = notification.clone();
                HandlerInvocation::from_fn(notification_type, position, move || {
                    start(handler.handle(notification), notification_type, policy)
                })
            })
            .collect();

        strategy.publish(invocations)?;
        Ok(response::completed())
    }
}

impl<N: Notification> Default for NotificationHandlerWrapper<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Notification> ErasedNotificationWrapper for NotificationHandlerWrapper<N> {
    fn handle_erased(
        &self,
        notification: ErasedValue,
        factory: &dyn HandlerFactory,
        strategy: &dyn PublishStrategy,
        policy: DetachPolicy,
    ) -> Result<Response<()>, DispatchError> {
        let notification = notification
            .downcast::<N>()
            .map_err(|_| DispatchError::wrong_type("notification", type_name::<N>()))?;
        self.handle(*notification, factory, strategy, policy)
    }

    fn notification_type(&self) -> &'static str {
        type_name::<N>()
    }

    fn request_factory(&self) -> RequestWrapperFactory {
        request_wrapper::<N>
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

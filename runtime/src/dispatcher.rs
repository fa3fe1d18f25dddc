//! The dispatcher.
//!
//! Routes a request to the single handler registered for it, or a
//! notification to every registered handler, without the caller knowing
//! any handler type.
//!
//! ```text
//! send(request) ──► wrapper cache ──► RequestHandlerWrapper<Q> ──► factory ──► handler
//!                        │
//!                      miss
//!                        │
//!                        ▼
//!            build wrapper (typed: from Q, erased: from the catalog)
//! ```
//!
//! Wrappers are built once per concrete type and shared by every clone of a
//! dispatcher. The typed and type-erased entry points share the same caches,
//! so a type first seen on one path is served from the cache on the other.

use crate::cache::WrapperCache;
use crate::catalog::{CatalogEntry, RequestCatalog, notification_wrapper, request_wrapper};
use crate::config::{DetachPolicy, DispatcherConfig};
use crate::metrics::DispatchMetrics;
use crate::notification::{ErasedNotificationWrapper, NotificationHandlerWrapper};
use crate::publish::PublishStrategy;
use crate::wrapper::{ErasedRequestWrapper, ErasedValue, RequestHandlerWrapper};
use observr_core::{DispatchError, HandlerFactory, Notification, Request, Response};
use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::Arc;

const UNREGISTERED: &str = "value of an unregistered type";

/// Snapshot of the dispatcher's wrapper caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Request types with a cached wrapper
    pub request_types: usize,
    /// Notification types with a cached wrapper
    pub notification_types: usize,
    /// Wrappers installed across both caches
    pub wrappers_installed: u64,
    /// Wrappers built by a losing racer and thrown away
    pub wrappers_discarded: u64,
}

struct Inner {
    factory: Arc<dyn HandlerFactory>,
    config: DispatcherConfig,
    catalog: RequestCatalog,
    requests: WrapperCache<dyn ErasedRequestWrapper>,
    notifications: WrapperCache<dyn ErasedNotificationWrapper>,
}

/// Request/notification dispatcher.
///
/// Cloning is cheap; clones share the handler factory and wrapper caches.
///
/// # Example
///
/// ```
/// use observr_core::{HandlerDescriptor, HandlerFactory, HandlerInstance, Request, response};
/// use observr_runtime::Dispatcher;
///
/// struct Ping;
///
/// impl Request for Ping {
///     type Response = &'static str;
/// }
///
/// struct Handlers;
///
/// impl HandlerFactory for Handlers {
///     fn resolve(&self, _: &HandlerDescriptor) -> anyhow::Result<Option<HandlerInstance>> {
///         Ok(Some(HandlerInstance::new::<Ping, _>(|_: Ping| response::ready("pong"))))
///     }
///
///     fn resolve_all(&self, d: &HandlerDescriptor) -> anyhow::Result<Vec<HandlerInstance>> {
///         Ok(self.resolve(d)?.into_iter().collect())
///     }
/// }
///
/// # async fn example() -> anyhow::Result<()> {
/// let dispatcher = Dispatcher::new(Handlers);
/// let reply = dispatcher.send(Ping)?.await?;
/// assert_eq!(reply, "pong");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Create a dispatcher with the default configuration and no catalog.
    ///
    /// Type-erased calls only succeed for types already dispatched through
    /// the typed entry points; use [`Dispatcher::builder`] to register more.
    #[must_use]
    pub fn new(factory: impl HandlerFactory + 'static) -> Self {
        Self::builder(factory).build()
    }

    /// Start building a dispatcher around `factory`.
    #[must_use]
    pub fn builder(factory: impl HandlerFactory + 'static) -> DispatcherBuilder {
        DispatcherBuilder {
            factory: Arc::new(factory),
            config: DispatcherConfig::default(),
            catalog: RequestCatalog::new(),
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    /// Send a request to its single handler.
    ///
    /// Resolution happens now; the handler's work happens when the returned
    /// response is awaited. Handler failures surface through the response.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::HandlerNotFound`] when no handler is registered for `Q`
    /// - [`DispatchError::HandlerConstructionFailed`] when the factory fails
    #[tracing::instrument(skip_all, name = "dispatcher_send", fields(request = type_name::<Q>()))]
    pub fn send<Q: Request>(&self, request: Q) -> Result<Response<Q::Response>, DispatchError> {
        DispatchMetrics::record_send("typed");

        let wrapper = self
            .inner
            .requests
            .get_or_insert_with(TypeId::of::<Q>(), || {
                built_request_wrapper(type_name::<Q>(), request_wrapper::<Q>)
            });

        let factory = self.inner.factory.as_ref();
        match wrapper.as_any().downcast_ref::<RequestHandlerWrapper<Q>>() {
            Some(wrapper) => wrapper.handle(request, factory),
            None => {
                tracing::warn!("Cached request wrapper has an unexpected type, using a fresh one");
                RequestHandlerWrapper::<Q>::new().handle(request, factory)
            },
        }
    }

    /// Send a type-erased request to its single handler.
    ///
    /// Equivalent to [`send`](Self::send) for the value's concrete type; the
    /// response value is boxed the same way.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidArgument`] when the value's type is neither
    ///   registered nor previously sent or published
    /// - [`DispatchError::HandlerNotFound`] / [`DispatchError::HandlerConstructionFailed`]
    ///   as for [`send`](Self::send)
    #[tracing::instrument(skip_all, name = "dispatcher_send_erased")]
    pub fn send_erased(&self, request: ErasedValue) -> Result<Response<ErasedValue>, DispatchError> {
        DispatchMetrics::record_send("erased");

        let key = (*request).type_id();
        let wrapper = match self.inner.requests.get(key) {
            Some(wrapper) => wrapper,
            None => {
                // A type published before is also a request
                let (name, build) = if let Some(entry) = self.inner.catalog.get(key) {
                    (entry.type_name(), entry.request())
                } else if let Some(published) = self.inner.notifications.get(key) {
                    (published.notification_type(), published.request_factory())
                } else {
                    return Err(DispatchError::missing_capability(
                        "request",
                        UNREGISTERED,
                        "Request",
                    ));
                };
                self.inner
                    .requests
                    .get_or_insert_with(key, || built_request_wrapper(name, build))
            },
        };

        tracing::trace!(request = wrapper.request_type(), "Dispatching type-erased request");
        wrapper.handle_erased(request, self.inner.factory.as_ref())
    }

    /// Publish a notification to every handler registered for it.
    ///
    /// Every handler is started before this returns; the returned response
    /// only marks completion of the fan-out. Zero handlers is a no-op.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::HandlerConstructionFailed`] when the factory fails
    /// - [`DispatchError::HandlerFailed`] when a handler fails while starting
    ///   and the publish strategy reports it
    #[tracing::instrument(skip_all, name = "dispatcher_publish", fields(notification = type_name::<N>()))]
    pub fn publish<N: Notification>(&self, notification: N) -> Result<Response<()>, DispatchError> {
        DispatchMetrics::record_publish("typed");

        let wrapper = self
            .inner
            .notifications
            .get_or_insert_with(TypeId::of::<N>(), || {
                built_notification_wrapper(type_name::<N>(), notification_wrapper::<N>)
            });

        let (factory, strategy, policy) = self.publish_context();
        match wrapper
            .as_any()
            .downcast_ref::<NotificationHandlerWrapper<N>>()
        {
            Some(wrapper) => wrapper.handle(notification, factory, strategy, policy),
            None => {
                tracing::warn!(
                    "Cached notification wrapper has an unexpected type, using a fresh one"
                );
                NotificationHandlerWrapper::<N>::new().handle(notification, factory, strategy, policy)
            },
        }
    }

    /// Publish a type-erased notification.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidArgument`] when the value's type is not a
    ///   registered or previously published notification
    /// - otherwise as for [`publish`](Self::publish)
    #[tracing::instrument(skip_all, name = "dispatcher_publish_erased")]
    pub fn publish_erased(&self, notification: ErasedValue) -> Result<Response<()>, DispatchError> {
        DispatchMetrics::record_publish("erased");

        let key = (*notification).type_id();
        let wrapper = match self.inner.notifications.get(key) {
            Some(wrapper) => wrapper,
            None => {
                let entry = self.inner.catalog.get(key);
                let Some((name, build)) = entry
                    .and_then(|entry| entry.notification().map(|build| (entry.type_name(), build)))
                else {
                    let name = entry.map_or(UNREGISTERED, CatalogEntry::type_name);
                    return Err(DispatchError::missing_capability(
                        "notification",
                        name,
                        "Notification",
                    ));
                };
                self.inner
                    .notifications
                    .get_or_insert_with(key, || built_notification_wrapper(name, build))
            },
        };

        tracing::trace!(
            notification = wrapper.notification_type(),
            "Publishing type-erased notification"
        );
        let (factory, strategy, policy) = self.publish_context();
        wrapper.handle_erased(notification, factory, strategy, policy)
    }

    /// Snapshot of the wrapper caches.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let requests = &self.inner.requests;
        let notifications = &self.inner.notifications;
        CacheStats {
            request_types: requests.len(),
            notification_types: notifications.len(),
            wrappers_installed: requests.installed() + notifications.installed(),
            wrappers_discarded: requests.discarded() + notifications.discarded(),
        }
    }

    fn publish_context(&self) -> (&dyn HandlerFactory, &dyn PublishStrategy, DetachPolicy) {
        let inner = self.inner.as_ref();
        (
            inner.factory.as_ref(),
            inner.config.publish_strategy.as_ref(),
            inner.config.detach_policy,
        )
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.inner.config)
            .field("catalog", &self.inner.catalog.len())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn built_request_wrapper(
    type_name: &'static str,
    build: fn() -> Arc<dyn ErasedRequestWrapper>,
) -> Arc<dyn ErasedRequestWrapper> {
    DispatchMetrics::record_wrapper_created("request");
    tracing::debug!(request = type_name, "Building request wrapper");
    build()
}

fn built_notification_wrapper(
    type_name: &'static str,
    build: fn() -> Arc<dyn ErasedNotificationWrapper>,
) -> Arc<dyn ErasedNotificationWrapper> {
    DispatchMetrics::record_wrapper_created("notification");
    tracing::debug!(notification = type_name, "Building notification wrapper");
    build()
}

/// Builder for [`Dispatcher`].
///
/// # Example
///
/// ```ignore
/// let dispatcher = Dispatcher::builder(container)
///     .register_request::<Ping>()
///     .register_notification::<OrderPlaced>()
///     .with_publish_strategy(BestEffortPublish)
///     .build();
/// ```
pub struct DispatcherBuilder {
    factory: Arc<dyn HandlerFactory>,
    config: DispatcherConfig,
    catalog: RequestCatalog,
}

impl DispatcherBuilder {
    /// Make `Q` available to [`Dispatcher::send_erased`].
    #[must_use]
    pub fn register_request<Q: Request>(mut self) -> Self {
        self.catalog.register_request::<Q>();
        self
    }

    /// Make `N` available to [`Dispatcher::publish_erased`] and
    /// [`Dispatcher::send_erased`].
    #[must_use]
    pub fn register_notification<N: Notification>(mut self) -> Self {
        self.catalog.register_notification::<N>();
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the publish strategy.
    #[must_use]
    pub fn with_publish_strategy(mut self, strategy: impl PublishStrategy + 'static) -> Self {
        self.config = self.config.with_publish_strategy(strategy);
        self
    }

    /// Set the detach policy.
    #[must_use]
    pub fn with_detach_policy(mut self, policy: DetachPolicy) -> Self {
        self.config = self.config.with_detach_policy(policy);
        self
    }

    /// Build the dispatcher.
    #[must_use]
    pub fn build(self) -> Dispatcher {
        tracing::debug!(
            registered = self.catalog.len(),
            config = ?self.config,
            "Dispatcher built"
        );
        Dispatcher {
            inner: Arc::new(Inner {
                factory: self.factory,
                config: self.config,
                catalog: self.catalog,
                requests: WrapperCache::new(),
                notifications: WrapperCache::new(),
            }),
        }
    }
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("config", &self.config)
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

//! In-memory handler container
//!
//! [`InMemoryHandlerFactory`] stands in for a dependency-injection container:
//! handlers are registered per request type and resolved by capability
//! descriptor, the way a production container would serve the dispatcher.
//!
//! Three kinds of registration are supported:
//! - **Shared**: one handler instance, handed out on every resolution
//! - **Transient**: a constructor run on every resolution
//! - **Failing**: a resolution that always errors, to exercise construction failures

use observr_core::{HandlerDescriptor, HandlerFactory, HandlerInstance, Request, RequestHandler};
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

type Registration = Arc<dyn Fn() -> anyhow::Result<HandlerInstance> + Send + Sync>;

/// In-memory [`HandlerFactory`] for tests and small embedders.
///
/// The last registration for a request type wins for single-handler
/// resolution; [`resolve_all`](HandlerFactory::resolve_all) returns every
/// registration in the order it was made.
///
/// # Example
///
/// ```
/// use observr_core::{HandlerFactoryExt, Request, response};
/// use observr_testing::InMemoryHandlerFactory;
///
/// struct Ping;
///
/// impl Request for Ping {
///     type Response = &'static str;
/// }
///
/// let container = InMemoryHandlerFactory::new();
/// container.register::<Ping, _>(|_: Ping| response::ready("pong"));
///
/// assert_eq!(container.handler_count::<Ping>(), 1);
/// assert!(container.get_handler::<Ping>().is_ok());
/// ```
#[derive(Clone, Default)]
pub struct InMemoryHandlerFactory {
    registrations: Arc<RwLock<HashMap<TypeId, Vec<Registration>>>>,
}

impl InMemoryHandlerFactory {
    /// Create an empty container
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a shared handler instance for `Q`.
    pub fn register<Q, H>(&self, handler: H) -> &Self
    where
        Q: Request,
        H: RequestHandler<Q>,
    {
        let shared: Arc<dyn RequestHandler<Q>> = Arc::new(handler);
        self.push::<Q>(Arc::new(move || {
            Ok(HandlerInstance::from_shared::<Q>(Arc::clone(&shared)))
        }))
    }

    /// Register a constructor for `Q`, run on every resolution.
    pub fn register_transient<Q, H, F>(&self, constructor: F) -> &Self
    where
        Q: Request,
        H: RequestHandler<Q>,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.push::<Q>(Arc::new(move || Ok(HandlerInstance::new::<Q, _>(constructor()))))
    }

    /// Register a handler for `Q` whose construction always fails with `reason`.
    pub fn register_failing<Q: Request>(&self, reason: impl Into<String>) -> &Self {
        let reason = reason.into();
        self.push::<Q>(Arc::new(move || Err(anyhow::anyhow!(reason.clone()))))
    }

    /// Number of registrations for `Q`.
    #[must_use]
    pub fn handler_count<Q: Request>(&self) -> usize {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&HandlerDescriptor::of::<Q>().id())
            .map_or(0, Vec::len)
    }

    /// Remove every registration (for test isolation).
    pub fn clear(&self) {
        self.registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn push<Q: Request>(&self, registration: Registration) -> &Self {
        self.registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(HandlerDescriptor::of::<Q>().id())
            .or_default()
            .push(registration);
        self
    }

    fn snapshot(&self, descriptor: &HandlerDescriptor) -> Vec<Registration> {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&descriptor.id())
            .cloned()
            .unwrap_or_default()
    }
}

impl HandlerFactory for InMemoryHandlerFactory {
    fn resolve(&self, descriptor: &HandlerDescriptor) -> anyhow::Result<Option<HandlerInstance>> {
        // Constructors run outside the lock so they may use the container.
        self.snapshot(descriptor)
            .last()
            .map(|registration| registration())
            .transpose()
    }

    fn resolve_all(&self, descriptor: &HandlerDescriptor) -> anyhow::Result<Vec<HandlerInstance>> {
        self.snapshot(descriptor)
            .iter()
            .map(|registration| registration())
            .collect()
    }
}

impl fmt::Debug for InMemoryHandlerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registrations = self
            .registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("InMemoryHandlerFactory")
            .field("request_types", &registrations.len())
            .field(
                "registrations",
                &registrations.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

//! Handler factory contract.
//!
//! The dispatcher never constructs handlers. It asks an external factory,
//! usually backed by a dependency-injection container, for the handler(s)
//! registered under a capability descriptor:
//!
//! ```text
//! Dispatcher ──► HandlerDescriptor::of::<Q>() ──► HandlerFactory::resolve / resolve_all
//!                                                        │
//!                                                        ▼
//!                                           HandlerInstance(s) ──► downcast ──► Arc<dyn RequestHandler<Q>>
//! ```
//!
//! The factory is type-erased so it can live behind `Arc<dyn HandlerFactory>`;
//! [`HandlerFactoryExt`] restores the types and maps factory outcomes onto
//! [`DispatchError`].

use crate::error::DispatchError;
use crate::request::{Request, RequestHandler};
use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

/// A shared handle to a handler of `Q`.
pub type SharedHandler<Q> = Arc<dyn RequestHandler<Q>>;

/// Describes the handler capability `RequestHandler<Q>` for some request `Q`.
///
/// Factories key their registrations by [`HandlerDescriptor::id`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerDescriptor {
    id: TypeId,
    handler: &'static str,
    request: &'static str,
}

impl HandlerDescriptor {
    /// Descriptor of the handler capability for request type `Q`.
    #[must_use]
    pub fn of<Q: Request>() -> Self {
        Self {
            id: TypeId::of::<dyn RequestHandler<Q>>(),
            handler: type_name::<dyn RequestHandler<Q>>(),
            request: type_name::<Q>(),
        }
    }

    /// Identity of the capability.
    #[must_use]
    pub const fn id(&self) -> TypeId {
        self.id
    }

    /// Readable name of the handler capability.
    #[must_use]
    pub const fn handler_name(&self) -> &'static str {
        self.handler
    }

    /// Readable name of the request type.
    #[must_use]
    pub const fn request_name(&self) -> &'static str {
        self.request
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("handler", &self.handler)
            .field("request", &self.request)
            .finish()
    }
}

impl fmt::Display for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.handler)
    }
}

/// A handler produced by a factory, with its request type erased.
pub struct HandlerInstance {
    descriptor: HandlerDescriptor,
    handler: Box<dyn Any + Send + Sync>,
}

impl HandlerInstance {
    /// Wrap a handler value.
    #[must_use]
    pub fn new<Q, H>(handler: H) -> Self
    where
        Q: Request,
        H: RequestHandler<Q>,
    {
        Self::from_shared::<Q>(Arc::new(handler))
    }

    /// Wrap a handler that is already shared.
    #[must_use]
    pub fn from_shared<Q: Request>(handler: SharedHandler<Q>) -> Self {
        Self {
            descriptor: HandlerDescriptor::of::<Q>(),
            handler: Box::new(handler),
        }
    }

    /// The capability this instance satisfies.
    #[must_use]
    pub const fn descriptor(&self) -> HandlerDescriptor {
        self.descriptor
    }

    /// Recover the typed handler.
    ///
    /// # Errors
    ///
    /// Returns the instance unchanged when it does not handle `Q`.
    pub fn downcast<Q: Request>(self) -> Result<SharedHandler<Q>, Self> {
        let Self {
            descriptor,
            handler,
        } = self;
        match handler.downcast::<SharedHandler<Q>>() {
            Ok(shared) => Ok(*shared),
            Err(handler) => Err(Self {
                descriptor,
                handler,
            }),
        }
    }
}

impl fmt::Debug for HandlerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerInstance")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// External handler resolution capability.
///
/// Called synchronously by the dispatcher. Any error returned is reported to
/// callers as [`DispatchError::HandlerConstructionFailed`].
pub trait HandlerFactory: Send + Sync {
    /// Resolve the single handler registered for `descriptor`.
    ///
    /// `Ok(None)` means nothing is registered.
    ///
    /// # Errors
    ///
    /// Returns the cause when the handler cannot be built.
    fn resolve(&self, descriptor: &HandlerDescriptor) -> anyhow::Result<Option<HandlerInstance>>;

    /// Resolve every handler registered for `descriptor`.
    ///
    /// An empty collection is a valid answer.
    ///
    /// # Errors
    ///
    /// Returns the cause when any of the handlers cannot be built.
    fn resolve_all(&self, descriptor: &HandlerDescriptor) -> anyhow::Result<Vec<HandlerInstance>>;
}

impl<F: HandlerFactory + ?Sized> HandlerFactory for Arc<F> {
    fn resolve(&self, descriptor: &HandlerDescriptor) -> anyhow::Result<Option<HandlerInstance>> {
        (**self).resolve(descriptor)
    }

    fn resolve_all(&self, descriptor: &HandlerDescriptor) -> anyhow::Result<Vec<HandlerInstance>> {
        (**self).resolve_all(descriptor)
    }
}

impl<F: HandlerFactory + ?Sized> HandlerFactory for &F {
    fn resolve(&self, descriptor: &HandlerDescriptor) -> anyhow::Result<Option<HandlerInstance>> {
        (**self).resolve(descriptor)
    }

    fn resolve_all(&self, descriptor: &HandlerDescriptor) -> anyhow::Result<Vec<HandlerInstance>> {
        (**self).resolve_all(descriptor)
    }
}

/// Typed lookups on top of [`HandlerFactory`].
pub trait HandlerFactoryExt: HandlerFactory {
    /// Get the single handler for `Q`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::HandlerNotFound`] when nothing is registered
    /// - [`DispatchError::HandlerConstructionFailed`] when the factory fails or
    ///   hands back an instance for a different capability
    fn get_handler<Q: Request>(&self) -> Result<SharedHandler<Q>, DispatchError> {
        let descriptor = HandlerDescriptor::of::<Q>();
        let instance = self
            .resolve(&descriptor)
            .map_err(|source| DispatchError::HandlerConstructionFailed {
                request_type: descriptor.request_name(),
                source,
            })?
            .ok_or(DispatchError::HandlerNotFound {
                request_type: descriptor.request_name(),
                handler: descriptor.handler_name(),
            })?;

        downcast_instance(&descriptor, instance)
    }

    /// Get every handler for `Q`, in the order the factory returns them.
    ///
    /// # Errors
    ///
    /// [`DispatchError::HandlerConstructionFailed`] when the factory fails or
    /// hands back an instance for a different capability.
    fn get_handlers<Q: Request>(&self) -> Result<Vec<SharedHandler<Q>>, DispatchError> {
        let descriptor = HandlerDescriptor::of::<Q>();
        self.resolve_all(&descriptor)
            .map_err(|source| DispatchError::HandlerConstructionFailed {
                request_type: descriptor.request_name(),
                source,
            })?
            .into_iter()
            .map(|instance| downcast_instance(&descriptor, instance))
            .collect()
    }
}

impl<F: HandlerFactory + ?Sized> HandlerFactoryExt for F {}

fn downcast_instance<Q: Request>(
    descriptor: &HandlerDescriptor,
    instance: HandlerInstance,
) -> Result<SharedHandler<Q>, DispatchError> {
    instance
        .downcast::<Q>()
        .map_err(|wrong| DispatchError::HandlerConstructionFailed {
            request_type: descriptor.request_name(),
            source: anyhow::anyhow!(
                "factory returned a {} where a {} was requested",
                wrong.descriptor().handler_name(),
                descriptor.handler_name()
            ),
        })
}

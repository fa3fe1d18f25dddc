//! Handler-invocation wrapper.
//!
//! One [`RequestHandlerWrapper<Q>`] exists per concrete request type `Q`. It
//! closes over `Q` and `Q::Response` through its own type and holds no state,
//! so a single instance serves every caller.
//!
//! Two entry points share the wrapper:
//!
//! - [`RequestHandlerWrapper::handle`] for call sites that know `Q` statically
//! - [`ErasedRequestWrapper::handle_erased`] for call sites holding a
//!   `Box<dyn Any + Send>`; it downcasts to `Q` and boxes the response value

use crate::metrics::DispatchMetrics;
use futures::TryFutureExt;
use observr_core::{DispatchError, HandlerFactory, HandlerFactoryExt, Request, Response};
use std::any::{Any, type_name};
use std::marker::PhantomData;
use std::time::Instant;

/// A type-erased request or response value.
pub type ErasedValue = Box<dyn Any + Send>;

/// Type-erased view of a [`RequestHandlerWrapper`].
pub trait ErasedRequestWrapper: Send + Sync {
    /// Dispatch a type-erased request.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidArgument`] when `request` is not of this
    ///   wrapper's type
    /// - [`DispatchError::HandlerNotFound`] / [`DispatchError::HandlerConstructionFailed`]
    ///   from handler resolution
    fn handle_erased(
        &self,
        request: ErasedValue,
        factory: &dyn HandlerFactory,
    ) -> Result<Response<ErasedValue>, DispatchError>;

    /// Concrete request type this wrapper serves.
    fn request_type(&self) -> &'static str;

    /// Access to the concrete wrapper for typed dispatch.
    fn as_any(&self) -> &dyn Any;
}

/// Single-handler wrapper for request type `Q`.
pub struct RequestHandlerWrapper<Q> {
    _request: PhantomData<fn() -> Q>,
}

impl<Q: Request> RequestHandlerWrapper<Q> {
    /// Create the wrapper.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _request: PhantomData,
        }
    }

    /// Resolve the handler for `Q` and invoke it.
    ///
    /// The handler's response is returned as is.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::HandlerNotFound`] when the factory has no handler
    /// - [`DispatchError::HandlerConstructionFailed`] when the factory fails
    pub fn handle(
        &self,
        request: Q,
        factory: &dyn HandlerFactory,
    ) -> Result<Response<Q::Response>, DispatchError> {
        let started = Instant::now();
        let handler = factory.get_handler::<Q>().inspect_err(|error| {
            let reason = match error {
                DispatchError::HandlerNotFound { .. } => "not_found",
                _ => "construction",
            };
            DispatchMetrics::record_resolve_error(reason);
        })?;
        DispatchMetrics::record_resolve(started.elapsed());

        Ok(handler.handle(request))
    }
}

impl<Q: Request> Default for RequestHandlerWrapper<Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q: Request> ErasedRequestWrapper for RequestHandlerWrapper<Q> {
    fn handle_erased(
        &self,
        request: ErasedValue,
        factory: &dyn HandlerFactory,
    ) -> Result<Response<ErasedValue>, DispatchError> {
        let request = request
            .downcast::<Q>()
            .map_err(|_| DispatchError::wrong_type("request", type_name::<Q>()))?;
        let response = self.handle(*request, factory)?;
        Ok(Box::pin(
            response.map_ok(|value| Box::new(value) as ErasedValue),
        ))
    }

    fn request_type(&self) -> &'static str {
        type_name::<Q>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code can use unwrap

    use super::*;
    use observr_core::{HandlerDescriptor, HandlerInstance, response};

    struct Double(u32);

    impl Request for Double {
        type Response = u32;
    }

    struct Registered(bool);

    impl HandlerFactory for Registered {
        fn resolve(&self, _: &HandlerDescriptor) -> anyhow::Result<Option<HandlerInstance>> {
            Ok(self.0.then(|| {
                HandlerInstance::new::<Double, _>(|request: Double| response::ready(request.0 * 2))
            }))
        }

        fn resolve_all(&self, d: &HandlerDescriptor) -> anyhow::Result<Vec<HandlerInstance>> {
            Ok(self.resolve(d)?.into_iter().collect())
        }
    }

    #[tokio::test]
    async fn typed_and_erased_entries_agree() {
        let wrapper = RequestHandlerWrapper::<Double>::new();
        let factory = Registered(true);

        let typed = wrapper.handle(Double(21), &factory).unwrap().await.unwrap();
        let erased = wrapper
            .handle_erased(Box::new(Double(21)), &factory)
            .unwrap()
            .await
            .unwrap();

        assert_eq!(typed, 42);
        assert_eq!(*erased.downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn missing_handler_fails_before_any_future_exists() {
        let result = RequestHandlerWrapper::<Double>::new().handle(Double(1), &Registered(false));
        assert!(matches!(result, Err(DispatchError::HandlerNotFound { .. })));
    }

    #[test]
    fn erased_entry_rejects_other_types() {
        let result = RequestHandlerWrapper::<Double>::new()
            .handle_erased(Box::new("not a request"), &Registered(true));
        let Err(DispatchError::InvalidArgument { argument, reason }) = result else {
            unreachable!("expected InvalidArgument");
        };
        assert_eq!(argument, "request");
        assert_eq!(reason, format!("value is not a {}", type_name::<Double>()));
    }
}

//! Request catalog for type-erased dispatch.
//!
//! A value behind `Box<dyn Any + Send>` only reveals its `TypeId`. The catalog
//! maps that id to the capabilities the type was registered with, each as a
//! constructor for the wrapper that serves it. It is filled once, when the
//! dispatcher is built, and read without locking afterwards.

use crate::notification::{ErasedNotificationWrapper, NotificationHandlerWrapper};
use crate::wrapper::{ErasedRequestWrapper, RequestHandlerWrapper};
use observr_core::{Notification, Request};
use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds the request wrapper for one registered type.
pub type RequestWrapperFactory = fn() -> Arc<dyn ErasedRequestWrapper>;

/// Builds the notification wrapper for one registered type.
pub type NotificationWrapperFactory = fn() -> Arc<dyn ErasedNotificationWrapper>;

/// Build the request wrapper for `Q`.
#[must_use]
pub fn request_wrapper<Q: Request>() -> Arc<dyn ErasedRequestWrapper> {
    Arc::new(RequestHandlerWrapper::<Q>::new())
}

/// Build the notification wrapper for `N`.
#[must_use]
pub fn notification_wrapper<N: Notification>() -> Arc<dyn ErasedNotificationWrapper> {
    Arc::new(NotificationHandlerWrapper::<N>::new())
}

/// Capabilities registered for one concrete type.
#[derive(Clone, Copy)]
pub struct CatalogEntry {
    type_name: &'static str,
    request: RequestWrapperFactory,
    notification: Option<NotificationWrapperFactory>,
}

impl CatalogEntry {
    /// Name of the registered type.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Constructor for the request wrapper.
    #[must_use]
    pub const fn request(&self) -> RequestWrapperFactory {
        self.request
    }

    /// Constructor for the notification wrapper, if the type is a notification.
    #[must_use]
    pub const fn notification(&self) -> Option<NotificationWrapperFactory> {
        self.notification
    }
}

impl std::fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("type_name", &self.type_name)
            .field("notification", &self.notification.is_some())
            .finish()
    }
}

/// `TypeId` → registered capabilities.
#[derive(Debug, Clone, Default)]
pub struct RequestCatalog {
    entries: HashMap<TypeId, CatalogEntry>,
}

impl RequestCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `Q` as a request.
    ///
    /// Registering a type that is already a notification keeps that capability.
    pub fn register_request<Q: Request>(&mut self) {
        self.entries
            .entry(TypeId::of::<Q>())
            .or_insert(CatalogEntry {
                type_name: type_name::<Q>(),
                request: request_wrapper::<Q>,
                notification: None,
            });
    }

    /// Register `N` as a notification (and therefore also as a request).
    pub fn register_notification<N: Notification>(&mut self) {
        let entry = self
            .entries
            .entry(TypeId::of::<N>())
            .or_insert(CatalogEntry {
                type_name: type_name::<N>(),
                request: request_wrapper::<N>,
                notification: None,
            });
        entry.notification = Some(notification_wrapper::<N>);
    }

    /// Look up the capabilities of a type.
    #[must_use]
    pub fn get(&self, key: TypeId) -> Option<&CatalogEntry> {
        self.entries.get(&key)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

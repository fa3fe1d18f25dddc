//! # ObservR Core
//!
//! Capability contracts for the ObservR request/response and publish/subscribe
//! dispatcher.
//!
//! This crate only describes shapes. The dispatcher, its handler wrappers and
//! the wrapper caches live in `observr-runtime`.
//!
//! ## Core Concepts
//!
//! - **Request**: A value whose type alone determines its handler(s) and the
//!   response it expects
//! - **Notification**: A completion-only request, fanned out to zero or more handlers
//! - **Handler**: Application logic bound to exactly one request type
//! - **Response**: A cold, boxed future carrying the handler's result
//! - **Handler Factory**: The external container that owns and builds handlers
//!
//! ## Example
//!
//! ```
//! use observr_core::{Request, RequestHandler, Response, response};
//!
//! #[derive(Clone)]
//! struct OrderPlaced {
//!     order_id: u64,
//! }
//!
//! // Unit response: a notification
//! impl Request for OrderPlaced {
//!     type Response = ();
//! }
//!
//! struct AuditHandler;
//!
//! impl RequestHandler<OrderPlaced> for AuditHandler {
//!     fn handle(&self, event: OrderPlaced) -> Response<()> {
//!         response::from_future(async move {
//!             println!("order {} placed", event.order_id);
//!             Ok(())
//!         })
//!     }
//! }
//! ```

pub mod error;
pub mod factory;
pub mod request;
pub mod response;

pub use error::DispatchError;
pub use factory::{
    HandlerDescriptor, HandlerFactory, HandlerFactoryExt, HandlerInstance, SharedHandler,
};
pub use request::{Notification, Request, RequestHandler, Response};

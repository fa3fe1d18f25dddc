//! # ObservR Runtime
//!
//! Dispatcher implementation for the ObservR request/response and
//! publish/subscribe model.
//!
//! ## Core Components
//!
//! - **Dispatcher**: Typed and type-erased `send`/`publish` entry points
//! - **Handler Wrappers**: One per concrete request or notification type,
//!   bridging the caller to handlers resolved from the handler factory
//! - **Wrapper Cache**: Concurrent get-or-create map from type to wrapper
//! - **Publish Strategies**: How a notification's handlers are run and how
//!   their failures are aggregated
//!
//! ## Example
//!
//! ```ignore
//! use observr_runtime::{BestEffortPublish, Dispatcher};
//!
//! let dispatcher = Dispatcher::builder(container)
//!     .register_notification::<OrderPlaced>()
//!     .with_publish_strategy(BestEffortPublish)
//!     .build();
//!
//! // One handler, one response
//! let total = dispatcher.send(PriceQuote { sku })?.await?;
//!
//! // Every handler, started before publish returns
//! dispatcher.publish(OrderPlaced { order_id })?.await?;
//! ```

/// Concurrent per-type wrapper cache
pub mod cache;

/// Registered request and notification types for type-erased dispatch
pub mod catalog;

/// Dispatcher configuration
pub mod config;

/// The dispatcher and its builder
pub mod dispatcher;

/// Prometheus metrics for observability
pub mod metrics;

/// Notification fan-out wrapper
pub mod notification;

/// Aggregation policies for notification fan-out
pub mod publish;

/// Single-handler request wrapper
pub mod wrapper;

pub use config::{DetachPolicy, DispatcherConfig};
pub use dispatcher::{CacheStats, Dispatcher, DispatcherBuilder};
pub use notification::HandlerInvocation;
pub use publish::{BestEffortPublish, PublishStrategy, SequentialPublish};
pub use wrapper::ErasedValue;

//! Aggregation policies for notification fan-out.
//!
//! The notification wrapper turns every resolved handler into a
//! [`HandlerInvocation`] and hands the whole batch to a [`PublishStrategy`].
//! The strategy decides the order and what a failing handler means for the
//! rest of the batch.
//!
//! - [`SequentialPublish`] (default): collection order, fail-fast
//! - [`BestEffortPublish`]: collection order, every handler is started,
//!   failures are logged and counted
//!
//! Closures with the signature of [`PublishStrategy::publish`] are strategies too:
//!
//! ```
//! use observr_runtime::notification::HandlerInvocation;
//! use observr_runtime::config::DispatcherConfig;
//! use observr_core::DispatchError;
//!
//! // Start handlers in reverse registration order
//! let reversed = |invocations: Vec<HandlerInvocation>| -> Result<(), DispatchError> {
//!     for invocation in invocations.into_iter().rev() {
//!         invocation.invoke()?;
//!     }
//!     Ok(())
//! };
//!
//! let config = DispatcherConfig::default().with_publish_strategy(reversed);
//! # let _ = config;
//! ```

use crate::metrics::DispatchMetrics;
use crate::notification::HandlerInvocation;
use observr_core::DispatchError;

/// Aggregation policy used by `publish`.
///
/// Implementations must invoke each [`HandlerInvocation`] at most once and
/// return only after every invocation they intend to run has been invoked.
pub trait PublishStrategy: Send + Sync {
    /// Run the invocations for one published notification.
    ///
    /// # Errors
    ///
    /// Returns the failure that should surface to the publisher's caller.
    fn publish(&self, invocations: Vec<HandlerInvocation>) -> Result<(), DispatchError>;

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<F> PublishStrategy for F
where
    F: Fn(Vec<HandlerInvocation>) -> Result<(), DispatchError> + Send + Sync,
{
    fn publish(&self, invocations: Vec<HandlerInvocation>) -> Result<(), DispatchError> {
        self(invocations)
    }

    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Invoke handlers one after another; the first failure stops the batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialPublish;

impl PublishStrategy for SequentialPublish {
    fn publish(&self, invocations: Vec<HandlerInvocation>) -> Result<(), DispatchError> {
        for invocation in invocations {
            invocation.invoke()?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}

/// Invoke every handler regardless of earlier failures.
///
/// Failures are logged and counted; the publisher's caller always sees success.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestEffortPublish;

impl PublishStrategy for BestEffortPublish {
    fn publish(&self, invocations: Vec<HandlerInvocation>) -> Result<(), DispatchError> {
        let total = invocations.len();
        let mut failed = 0_usize;

        for invocation in invocations {
            let position = invocation.position();
            if let Err(error) = invocation.invoke() {
                failed += 1;
                DispatchMetrics::record_handler_failure("started");
                tracing::warn!(position, error = %error, "Notification handler failed, continuing");
            }
        }

        if failed > 0 {
            tracing::debug!(failed, total, "Best-effort publish finished with failures");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "best_effort"
    }
}

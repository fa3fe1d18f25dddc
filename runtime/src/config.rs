//! Dispatcher configuration.

use crate::publish::{PublishStrategy, SequentialPublish};
use std::fmt;
use std::sync::Arc;

/// What happens to a notification handler whose future is still pending
/// after it has been started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetachPolicy {
    /// Keep driving it to completion in the background
    ///
    /// Uses the current tokio runtime when there is one, a dedicated thread
    /// otherwise. A late failure is logged and counted.
    #[default]
    Spawn,

    /// Drop it after the first poll
    Abandon,
}

/// Configuration for a [`Dispatcher`](crate::Dispatcher).
///
/// # Example
///
/// ```
/// use observr_runtime::config::{DetachPolicy, DispatcherConfig};
/// use observr_runtime::publish::BestEffortPublish;
///
/// let config = DispatcherConfig::default()
///     .with_publish_strategy(BestEffortPublish)
///     .with_detach_policy(DetachPolicy::Spawn);
/// # let _ = config;
/// ```
#[derive(Clone)]
pub struct DispatcherConfig {
    /// Aggregation policy used by `publish`
    pub publish_strategy: Arc<dyn PublishStrategy>,
    /// Handling of notification handlers still running after their first poll
    pub detach_policy: DetachPolicy,
}

impl DispatcherConfig {
    /// Create a configuration with custom values
    #[must_use]
    pub fn new(publish_strategy: Arc<dyn PublishStrategy>, detach_policy: DetachPolicy) -> Self {
        Self {
            publish_strategy,
            detach_policy,
        }
    }

    /// Set the publish strategy
    #[must_use]
    pub fn with_publish_strategy(mut self, strategy: impl PublishStrategy + 'static) -> Self {
        self.publish_strategy = Arc::new(strategy);
        self
    }

    /// Set the detach policy
    #[must_use]
    pub fn with_detach_policy(mut self, policy: DetachPolicy) -> Self {
        self.detach_policy = policy;
        self
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            publish_strategy: Arc::new(SequentialPublish),
            detach_policy: DetachPolicy::default(),
        }
    }
}

impl fmt::Debug for DispatcherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherConfig")
            .field("publish_strategy", &self.publish_strategy.name())
            .field("detach_policy", &self.detach_policy)
            .finish()
    }
}

//! # ObservR Testing
//!
//! Testing utilities for code built on the ObservR dispatcher.
//!
//! This crate provides:
//! - [`InMemoryHandlerFactory`]: an in-memory handler container
//! - [`TextSink`]: shared text output for handlers under test
//! - [`init_test_tracing`]: log output for failing tests
//!
//! ## Example
//!
//! ```ignore
//! use observr_runtime::Dispatcher;
//! use observr_testing::{InMemoryHandlerFactory, TextSink};
//!
//! #[tokio::test]
//! async fn test_ping() {
//!     let sink = TextSink::new();
//!     let container = InMemoryHandlerFactory::new();
//!     container.register::<Ping, _>(PingHandler::new(sink.clone()));
//!
//!     let dispatcher = Dispatcher::new(container);
//!     dispatcher.send(Ping { message: "Ping".into() })?.await?;
//!
//!     assert_eq!(sink.lines(), vec!["Ping Pong"]);
//! }
//! ```

pub mod container;
pub mod sink;

pub use container::InMemoryHandlerFactory;
pub use sink::TextSink;

/// Install a test-friendly tracing subscriber.
///
/// Output goes through the test harness capture and is filtered by
/// `RUST_LOG` (default: debug for the ObservR crates). Calling this more than once, or from
/// tests running in parallel, is harmless.
pub fn init_test_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    // Another test may have installed a subscriber already.
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "observr_core=debug,observr_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

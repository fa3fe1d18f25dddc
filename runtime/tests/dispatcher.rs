//! Integration tests for the dispatcher
//!
//! Exercises `send`, `send_erased`, `publish` and `publish_erased` against the
//! in-memory handler container.

#![allow(clippy::unwrap_used, clippy::panic)] // Test code can use unwrap

use observr_core::{DispatchError, RequestHandler, Response, response};
use observr_macros::Request;
use observr_runtime::{BestEffortPublish, DetachPolicy, Dispatcher};
use observr_testing::{InMemoryHandlerFactory, TextSink, init_test_tracing};
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Check {
    message: String,
}

#[derive(Debug, Clone, Request)]
#[request(response = Check)]
struct Mic {
    count: u32,
}

struct MicHandler;

impl RequestHandler<Mic> for MicHandler {
    fn handle(&self, request: Mic) -> Response<Check> {
        response::ready(Check {
            message: format!("Mic Check {} {}", request.count, request.count + 1),
        })
    }
}

#[derive(Debug, Clone, Request)]
struct Announcement {
    message: String,
}

struct Appender(TextSink);

impl RequestHandler<Announcement> for Appender {
    fn handle(&self, notification: Announcement) -> Response<()> {
        let sink = self.0.clone();
        response::from_future(async move {
            sink.write_line(format!("{} Notification", notification.message));
            Ok(())
        })
    }
}

/// Writes its tag when invoked; fails if the tag is `"fail"`.
struct Tagged(TextSink, &'static str);

impl RequestHandler<Announcement> for Tagged {
    fn handle(&self, _: Announcement) -> Response<()> {
        self.0.write_line(self.1);
        if self.1 == "fail" {
            response::fail(anyhow::anyhow!("handler refused"))
        } else {
            response::completed()
        }
    }
}

#[derive(Debug, Request)]
#[request(response = usize)]
struct Unhandled;

fn mic_dispatcher() -> Dispatcher {
    mic_dispatcher_with(InMemoryHandlerFactory::new())
}

fn mic_dispatcher_with(container: InMemoryHandlerFactory) -> Dispatcher {
    container.register::<Mic, _>(MicHandler);
    Dispatcher::builder(container)
        .register_request::<Mic>()
        .register_notification::<Announcement>()
        .build()
}

#[tokio::test]
async fn test_send_returns_handler_response() {
    init_test_tracing();
    let dispatcher = mic_dispatcher();

    let check = dispatcher.send(Mic { count: 1 }).unwrap().await.unwrap();

    assert_eq!(
        check,
        Check {
            message: "Mic Check 1 2".to_string()
        }
    );
}

#[tokio::test]
async fn test_erased_send_matches_typed_send() {
    let dispatcher = mic_dispatcher();

    let erased = dispatcher
        .send_erased(Box::new(Mic { count: 1 }))
        .unwrap()
        .await
        .unwrap();
    let typed = dispatcher.send(Mic { count: 1 }).unwrap().await.unwrap();

    assert_eq!(*erased.downcast::<Check>().unwrap(), typed);
}

#[tokio::test]
async fn test_wrapper_is_built_once_per_type() {
    let dispatcher = mic_dispatcher();

    for count in 0..50 {
        dispatcher.send(Mic { count }).unwrap().await.unwrap();
        dispatcher
            .send_erased(Box::new(Mic { count }))
            .unwrap()
            .await
            .unwrap();
    }

    let stats = dispatcher.stats();
    assert_eq!(stats.request_types, 1);
    assert_eq!(stats.wrappers_installed, 1);
}

#[test]
fn test_missing_handler_fails_synchronously() {
    let dispatcher = mic_dispatcher();

    let Err(error) = dispatcher.send(Unhandled) else {
        panic!("expected HandlerNotFound");
    };

    assert!(matches!(error, DispatchError::HandlerNotFound { .. }));
    assert!(error.to_string().contains("Unhandled"));
}

#[test]
fn test_factory_failure_is_construction_failure() {
    let container = InMemoryHandlerFactory::new();
    container.register_failing::<Mic>("missing dependency: TextWriter");
    let dispatcher = Dispatcher::new(container);

    let Err(DispatchError::HandlerConstructionFailed { request_type, source }) =
        dispatcher.send(Mic { count: 1 })
    else {
        panic!("expected HandlerConstructionFailed");
    };

    assert!(request_type.ends_with("Mic"));
    assert_eq!(source.to_string(), "missing dependency: TextWriter");
}

#[test]
fn test_publish_reports_factory_failure() {
    let sink = TextSink::new();
    let container = InMemoryHandlerFactory::new();
    container
        .register::<Announcement, _>(Appender(sink.clone()))
        .register_failing::<Announcement>("missing dependency: TextWriter");
    let dispatcher = Dispatcher::new(container);

    let Err(DispatchError::HandlerConstructionFailed { request_type, source }) =
        dispatcher.publish(Announcement {
            message: "Hello".to_string(),
        })
    else {
        panic!("expected HandlerConstructionFailed");
    };

    assert!(request_type.ends_with("Announcement"));
    assert_eq!(source.to_string(), "missing dependency: TextWriter");
    // No handler starts when the collection cannot be built
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_handler_failure_travels_through_the_response() {
    let container = InMemoryHandlerFactory::new();
    container.register::<Mic, _>(|_: Mic| response::fail::<Check>(anyhow::anyhow!("out of tune")));
    let dispatcher = Dispatcher::new(container);

    let response = dispatcher.send(Mic { count: 1 }).unwrap();

    assert_eq!(response.await.unwrap_err().to_string(), "out of tune");
}

#[tokio::test]
async fn test_send_does_not_start_the_handler() {
    let sink = TextSink::new();
    let container = InMemoryHandlerFactory::new();
    let writer = sink.clone();
    container.register::<Mic, _>(move |mic: Mic| {
        let writer = writer.clone();
        response::from_future(async move {
            writer.write_line("handled");
            Ok(Check {
                message: mic.count.to_string(),
            })
        })
    });
    let dispatcher = Dispatcher::new(container);

    let mut response = tokio_test::task::spawn(dispatcher.send(Mic { count: 7 }).unwrap());
    assert!(sink.is_empty());

    let check = tokio_test::assert_ready!(response.poll()).unwrap();
    assert_eq!(check.message, "7");
    assert_eq!(sink.lines(), vec!["handled"]);
}

#[tokio::test]
async fn test_publish_reaches_the_handler() {
    let sink = TextSink::new();
    let container = InMemoryHandlerFactory::new();
    container.register::<Announcement, _>(Appender(sink.clone()));
    let dispatcher = Dispatcher::new(container);

    dispatcher
        .publish(Announcement {
            message: "Message".to_string(),
        })
        .unwrap()
        .await
        .unwrap();

    assert_eq!(sink.contents(), "Message Notification\n");
}

#[tokio::test]
async fn test_publish_starts_every_handler_before_returning() {
    const HANDLERS: usize = 5;

    let started = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    let container = InMemoryHandlerFactory::new();
    for _ in 0..HANDLERS {
        let started = Arc::clone(&started);
        let gate = Arc::clone(&gate);
        let done_tx = done_tx.clone();
        container.register::<Announcement, _>(move |_: Announcement| {
            let started = Arc::clone(&started);
            let gate = Arc::clone(&gate);
            let done_tx = done_tx.clone();
            response::from_future(async move {
                started.fetch_add(1, Ordering::SeqCst);
                let _permit = gate.acquire().await?;
                done_tx.send(())?;
                Ok::<_, anyhow::Error>(())
            })
        });
    }
    let dispatcher = Dispatcher::new(container);

    // The completion marker is dropped unobserved on purpose.
    drop(
        dispatcher
            .publish(Announcement {
                message: String::new(),
            })
            .unwrap(),
    );
    assert_eq!(started.load(Ordering::SeqCst), HANDLERS);

    // Pending handlers keep running after publish returns.
    gate.add_permits(HANDLERS);
    for _ in 0..HANDLERS {
        tokio::time::timeout(Duration::from_secs(5), done_rx.recv())
            .await
            .unwrap()
            .unwrap();
    }
}

#[tokio::test]
async fn test_abandon_policy_drops_pending_handlers() {
    let container = InMemoryHandlerFactory::new();
    let sink = TextSink::new();
    let writer = sink.clone();
    container.register::<Announcement, _>(move |_: Announcement| {
        let writer = writer.clone();
        response::from_future(async move {
            tokio::task::yield_now().await;
            writer.write_line("finished");
            Ok(())
        })
    });
    let dispatcher = Dispatcher::builder(container)
        .with_detach_policy(DetachPolicy::Abandon)
        .build();

    dispatcher
        .publish(Announcement {
            message: String::new(),
        })
        .unwrap()
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_publish_without_handlers_is_a_no_op() {
    let dispatcher = mic_dispatcher();

    let result = dispatcher
        .publish(Announcement {
            message: "nobody listens".to_string(),
        })
        .unwrap()
        .await;

    assert!(result.is_ok());
}

#[test]
fn test_sequential_publish_stops_at_first_failure() {
    let sink = TextSink::new();
    let container = InMemoryHandlerFactory::new();
    container
        .register::<Announcement, _>(Tagged(sink.clone(), "first"))
        .register::<Announcement, _>(Tagged(sink.clone(), "fail"))
        .register::<Announcement, _>(Tagged(sink.clone(), "third"));
    let dispatcher = Dispatcher::new(container);

    let result = dispatcher.publish(Announcement {
        message: String::new(),
    });

    assert!(matches!(result, Err(DispatchError::HandlerFailed { .. })));
    assert_eq!(sink.lines(), vec!["first", "fail"]);
}

#[test]
fn test_best_effort_publish_runs_every_handler() {
    let sink = TextSink::new();
    let container = InMemoryHandlerFactory::new();
    container
        .register::<Announcement, _>(Tagged(sink.clone(), "first"))
        .register::<Announcement, _>(Tagged(sink.clone(), "fail"))
        .register::<Announcement, _>(Tagged(sink.clone(), "third"));
    let dispatcher = Dispatcher::builder(container)
        .with_publish_strategy(BestEffortPublish)
        .build();

    let result = dispatcher.publish(Announcement {
        message: String::new(),
    });

    assert!(result.is_ok());
    assert_eq!(sink.lines(), vec!["first", "fail", "third"]);
}

#[tokio::test]
async fn test_erased_publish_of_registered_notification() {
    let sink = TextSink::new();
    let container = InMemoryHandlerFactory::new();
    container.register::<Announcement, _>(Appender(sink.clone()));
    let dispatcher = Dispatcher::builder(container)
        .register_notification::<Announcement>()
        .build();

    let notification: Box<dyn std::any::Any + Send> = Box::new(Announcement {
        message: "Message".to_string(),
    });
    dispatcher.publish_erased(notification).unwrap().await.unwrap();

    assert_eq!(sink.lines(), vec!["Message Notification"]);
}

#[test]
fn test_erased_entry_points_reject_non_requests() {
    let dispatcher = mic_dispatcher();

    let Err(DispatchError::InvalidArgument { argument, reason }) =
        dispatcher.send_erased(Box::new("Mic Check"))
    else {
        panic!("expected InvalidArgument for send");
    };
    assert_eq!(argument, "request");
    assert!(reason.ends_with("does not implement Request"));

    let Err(DispatchError::InvalidArgument { argument, reason }) =
        dispatcher.publish_erased(Box::new(Mic { count: 1 }))
    else {
        panic!("expected InvalidArgument for publish");
    };
    assert_eq!(argument, "notification");
    assert!(reason.ends_with("does not implement Notification"));
}

#[tokio::test]
async fn test_notification_can_be_sent_to_a_single_handler() {
    let sink = TextSink::new();
    let container = InMemoryHandlerFactory::new();
    container.register::<Announcement, _>(Appender(sink.clone()));
    let dispatcher = mic_dispatcher_with(container);

    let unit = dispatcher
        .send_erased(Box::new(Announcement {
            message: "Direct".to_string(),
        }))
        .unwrap()
        .await
        .unwrap();

    assert!(unit.downcast::<()>().is_ok());
    assert_eq!(sink.lines(), vec!["Direct Notification"]);
}

#[tokio::test]
async fn test_published_type_can_be_sent_erased_without_registration() {
    let sink = TextSink::new();
    let container = InMemoryHandlerFactory::new();
    container.register::<Announcement, _>(Appender(sink.clone()));
    let dispatcher = Dispatcher::new(container);

    assert!(
        dispatcher
            .send_erased(Box::new(Announcement {
                message: "Early".to_string(),
            }))
            .is_err()
    );

    dispatcher
        .publish(Announcement {
            message: "Broadcast".to_string(),
        })
        .unwrap()
        .await
        .unwrap();
    dispatcher
        .send_erased(Box::new(Announcement {
            message: "Direct".to_string(),
        }))
        .unwrap()
        .await
        .unwrap();

    assert_eq!(
        sink.lines(),
        vec!["Broadcast Notification", "Direct Notification"]
    );
    assert_eq!(dispatcher.stats().request_types, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_use_converges() {
    const CALLERS: u32 = 64;

    let dispatcher = mic_dispatcher();
    let barrier = Arc::new(tokio::sync::Barrier::new(CALLERS as usize));

    let tasks: Vec<_> = (0..CALLERS)
        .map(|count| {
            let dispatcher = dispatcher.clone();
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                if count % 2 == 0 {
                    dispatcher.send(Mic { count }).unwrap().await.unwrap()
                } else {
                    *dispatcher
                        .send_erased(Box::new(Mic { count }))
                        .unwrap()
                        .await
                        .unwrap()
                        .downcast::<Check>()
                        .unwrap()
                }
            })
        })
        .collect();

    for (count, task) in (0..CALLERS).zip(tasks) {
        let check = task.await.unwrap();
        assert_eq!(check.message, format!("Mic Check {count} {}", count + 1));
    }

    let stats = dispatcher.stats();
    assert_eq!(stats.request_types, 1);
    assert_eq!(stats.wrappers_installed, 1);
}

proptest! {
    #[test]
    fn prop_typed_and_erased_send_agree(count in 0_u32..1_000_000) {
        let dispatcher = mic_dispatcher();

        let typed = futures::executor::block_on(dispatcher.send(Mic { count }).unwrap()).unwrap();
        let erased = futures::executor::block_on(
            dispatcher.send_erased(Box::new(Mic { count })).unwrap(),
        )
        .unwrap();

        prop_assert_eq!(*erased.downcast::<Check>().unwrap(), typed);
    }
}

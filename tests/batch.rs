//! Batch invocation: ordering, isolation and concurrency limits.

mod common;

use common::{slow_client, Mode, ScriptedBackend};
use mediahub_gateway::clock::ManualClock;
use mediahub_gateway::{
    CircuitBreakerConfig, CircuitState, Error, FailureKind, Gateway, InvocationRequest, Invoker,
    ServiceDescriptor, ToolParams,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_batch_preserves_request_order() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let slow = slow_client(Duration::from_millis(40), Arc::clone(&in_flight), Arc::clone(&peak));
    let fast = ScriptedBackend::new();

    let gateway = Gateway::builder()
        .with_service(ServiceDescriptor::new("slow", slow))
        .with_service(ServiceDescriptor::new("fast", fast.client()))
        .build()
        .unwrap();

    let requests = vec![
        InvocationRequest::new("slow", "first"),
        InvocationRequest::new("fast", "second"),
        InvocationRequest::new("slow", "third"),
        InvocationRequest::new("fast", "fourth"),
    ];
    let outcome = gateway.invoke_batch(requests, false).await.unwrap();

    let tools: Vec<&str> = outcome.results.iter().map(|r| r.tool.as_str()).collect();
    assert_eq!(tools, vec!["first", "second", "third", "fourth"]);
    assert!(outcome.all_succeeded());
    assert!(!outcome.return_partial);
}

#[tokio::test]
async fn test_failing_service_does_not_affect_others() {
    let broken = ScriptedBackend::failing();
    let healthy = ScriptedBackend::new();
    let gateway = Gateway::builder()
        .with_service(
            ServiceDescriptor::new("movies", broken.client())
                .with_breaker(CircuitBreakerConfig::new().with_failure_threshold(1)),
        )
        .with_service(ServiceDescriptor::new("tv-library", healthy.client()))
        .build()
        .unwrap();

    let requests = vec![
        InvocationRequest::new("tv-library", "calendar"),
        InvocationRequest::new("movies", "calendar"),
        InvocationRequest::new("tv-library", "wanted"),
    ];
    let outcome = gateway.invoke_batch(requests, true).await.unwrap();

    assert_eq!(outcome.len(), 3);
    assert!(outcome.results[0].success);
    assert_eq!(outcome.results[1].failure_kind(), Some(FailureKind::Backend));
    assert!(outcome.results[2].success);
    assert_eq!(outcome.success_count(), 2);
    assert_eq!(outcome.failure_count(), 1);
    assert!(outcome.is_partial());
    assert!(outcome.return_partial);
}

#[tokio::test]
async fn test_open_breaker_short_circuits_batch_elements() {
    let broken = ScriptedBackend::failing();
    let gateway = Gateway::builder()
        .with_service(
            ServiceDescriptor::new("media-server", broken.client())
                .with_breaker(CircuitBreakerConfig::new().with_failure_threshold(1)),
        )
        .build()
        .unwrap();

    gateway
        .invoke(InvocationRequest::new("media-server", "sessions"))
        .await
        .unwrap();
    assert_eq!(broken.calls(), 1);

    let requests = (0..3)
        .map(|_| InvocationRequest::new("media-server", "sessions"))
        .collect();
    let outcome = gateway.invoke_batch(requests, false).await.unwrap();

    assert_eq!(outcome.len(), 3);
    assert!(outcome.results.iter().all(|r| r.is_circuit_open()));
    assert_eq!(broken.calls(), 1);
}

#[tokio::test]
async fn test_unknown_service_rejects_whole_batch() {
    let backend = ScriptedBackend::new();
    let gateway = Gateway::builder()
        .with_service(ServiceDescriptor::new("tv-library", backend.client()))
        .build()
        .unwrap();

    let requests = vec![
        InvocationRequest::new("tv-library", "calendar"),
        InvocationRequest::new("nonexistent", "calendar"),
    ];
    let err = gateway.invoke_batch(requests, false).await.unwrap_err();

    assert!(matches!(err, Error::UnknownService { .. }));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_empty_batch() {
    let gateway = Gateway::builder()
        .with_service(ServiceDescriptor::new("tv-library", ScriptedBackend::new().client()))
        .build()
        .unwrap();

    let outcome = gateway.invoke_batch(Vec::new(), false).await.unwrap();
    assert!(outcome.is_empty());
    assert!(outcome.all_succeeded());
}

#[tokio::test]
async fn test_max_concurrency_is_respected() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let client = slow_client(Duration::from_millis(20), Arc::clone(&in_flight), Arc::clone(&peak));

    let gateway = Gateway::builder()
        .with_max_concurrency(2)
        .with_service(ServiceDescriptor::new("library", client))
        .build()
        .unwrap();

    let requests = (0..6)
        .map(|i| InvocationRequest::new("library", format!("scan_{}", i)))
        .collect();
    let outcome = gateway.invoke_batch(requests, false).await.unwrap();

    assert_eq!(outcome.success_count(), 6);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_batch_calls_show_up_in_stats() {
    let backend = ScriptedBackend::new();
    let gateway = Gateway::builder()
        .with_service(ServiceDescriptor::new("download-client", backend.client()))
        .build()
        .unwrap();

    let requests = (0..5)
        .map(|_| InvocationRequest::new("download-client", "queue_status"))
        .collect();
    gateway.invoke_batch(requests, false).await.unwrap();

    assert_eq!(gateway.service_stats("download-client").unwrap().calls, 5);
    assert_eq!(backend.calls(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_batch_still_settles_every_element() {
    let backend = ScriptedBackend::failing();
    backend.set_delay(Duration::from_millis(100));
    let gateway = Gateway::builder()
        .with_service(
            ServiceDescriptor::new("download-client", backend.client())
                .with_breaker(CircuitBreakerConfig::new().with_failure_threshold(10)),
        )
        .build()
        .unwrap();

    let requests = (0..3)
        .map(|_| InvocationRequest::new("download-client", "queue_status"))
        .collect();
    let dropped =
        tokio::time::timeout(Duration::from_millis(10), gateway.invoke_batch(requests, false)).await;
    assert!(dropped.is_err());

    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(backend.calls(), 3);
    let stats = gateway.service_stats("download-client").unwrap();
    assert_eq!(stats.calls, 3);
    assert_eq!(stats.failures, 3);
    assert_eq!(gateway.breaker_status("download-client").unwrap().failure_count, 3);
}

#[tokio::test]
async fn test_panicking_element_is_aborted_and_others_complete() {
    let broken = ScriptedBackend::with_mode(Mode::Panic);
    let healthy = ScriptedBackend::new();
    let gateway = Gateway::builder()
        .with_service(ServiceDescriptor::new("media-server", broken.client()))
        .with_service(ServiceDescriptor::new("tv-library", healthy.client()))
        .build()
        .unwrap();

    let requests = vec![
        InvocationRequest::new("tv-library", "calendar"),
        InvocationRequest::new("media-server", "sessions"),
        InvocationRequest::new("tv-library", "wanted"),
    ];
    let outcome = gateway.invoke_batch(requests, true).await.unwrap();

    assert_eq!(outcome.len(), 3);
    assert!(outcome.results[0].success);
    assert_eq!(outcome.results[1].failure_kind(), Some(FailureKind::Aborted));
    assert_eq!(outcome.results[1].service, "media-server");
    assert!(outcome.results[2].success);
    assert_eq!(gateway.service_stats("media-server").unwrap().failures, 1);
}

#[tokio::test]
async fn test_panicking_trial_in_batch_does_not_wedge_breaker() {
    let clock = Arc::new(ManualClock::new());
    let backend = ScriptedBackend::failing();
    let gateway = Gateway::builder()
        .with_clock(clock.clone())
        .with_service(
            ServiceDescriptor::new("movies", backend.client())
                .with_breaker(CircuitBreakerConfig::new().with_failure_threshold(1)),
        )
        .build()
        .unwrap();

    gateway.invoke_one("movies", "lookup", ToolParams::new(), None).await.unwrap();

    clock.advance(Duration::from_secs(61));
    backend.set_mode(Mode::Panic);
    let outcome = gateway
        .invoke_batch(vec![InvocationRequest::new("movies", "lookup")], false)
        .await
        .unwrap();
    assert_eq!(outcome.results[0].failure_kind(), Some(FailureKind::Aborted));

    clock.advance(Duration::from_secs(61));
    backend.set_mode(Mode::Ok);
    let recovered = gateway.invoke_one("movies", "lookup", ToolParams::new(), None).await.unwrap();
    assert!(recovered.success);
    assert_eq!(gateway.breaker_status("movies").unwrap().state, CircuitState::Closed);
}

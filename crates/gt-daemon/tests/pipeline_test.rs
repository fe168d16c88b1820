mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fix, ScriptedProvider};
use gt_core::config::TrackingConfig;
use gt_daemon::fix_stream::{FixStream, StreamEvent};
use gt_daemon::pipeline::{BootstrapOutcome, FixPipeline, FixSink};
use gt_daemon::provider::{Priority, ProviderError};
use tokio::time::Instant;

fn pipeline(provider: &Arc<ScriptedProvider>) -> FixPipeline {
    FixPipeline::new(provider.clone(), TrackingConfig::default())
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn bootstrap_returns_cached_fix_without_subscribing() {
    let provider = Arc::new(ScriptedProvider::with_cached(fix(1.0)));
    let outcome = pipeline(&provider).bootstrap().await.unwrap();

    assert_eq!(outcome, BootstrapOutcome::Cached(fix(1.0)));
    assert_eq!(provider.subscribe_count(), 0);
    assert_eq!(provider.unsubscribe_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn bootstrap_returns_fresh_fix_and_tears_down_request() {
    let provider = Arc::new(ScriptedProvider::with_fresh_after(Duration::from_secs(3), fix(2.0)));
    let started = Instant::now();

    let outcome = pipeline(&provider).bootstrap().await.unwrap();

    assert_eq!(outcome, BootstrapOutcome::Fresh(fix(2.0)));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(10), "elapsed {elapsed:?}");

    let requests = provider.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].priority, Priority::HighAccuracy);
    assert!(requests[0].interval.is_zero());
    assert_eq!(provider.unsubscribe_count(), 1);
    assert_eq!(provider.live_subscriptions(), 0);
}

#[tokio::test(start_paused = true)]
async fn bootstrap_times_out_and_tears_down_exactly_once() {
    let provider = Arc::new(ScriptedProvider::new());
    let started = Instant::now();

    let outcome = pipeline(&provider).bootstrap().await.unwrap();

    assert_eq!(outcome, BootstrapOutcome::TimedOut);
    assert_eq!(outcome.fix(), None);
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(provider.unsubscribe_count(), 1);

    // A late fix after the timeout has nowhere to go.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(provider.unsubscribe_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_bootstrap_still_releases_its_request() {
    let provider = Arc::new(ScriptedProvider::new());
    let pipeline = pipeline(&provider);

    let abandoned = tokio::time::timeout(Duration::from_secs(3), pipeline.bootstrap()).await;
    assert!(abandoned.is_err(), "caller gave up before the bootstrap timeout");

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(provider.subscribe_count(), 1);
    assert_eq!(provider.unsubscribe_count(), 1);
    assert_eq!(provider.live_subscriptions(), 0);
}

#[tokio::test(start_paused = true)]
async fn bootstrap_falls_through_when_last_known_fails() {
    let provider = Arc::new(ScriptedProvider::with_fresh_after(Duration::from_secs(1), fix(3.0)));
    *provider.last_known_error.lock().unwrap() = Some(ProviderError::Unavailable("cache offline".into()));

    let outcome = pipeline(&provider).bootstrap().await.unwrap();

    assert_eq!(outcome, BootstrapOutcome::Fresh(fix(3.0)));
    assert_eq!(provider.unsubscribe_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn bootstrap_reports_permission_denied_as_typed_error() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.deny_subscriptions(ProviderError::PermissionDenied);

    let err = pipeline(&provider).bootstrap().await.unwrap_err();

    assert_eq!(err, ProviderError::PermissionDenied);
    assert_eq!(provider.unsubscribe_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn bootstrap_timeout_follows_config() {
    let provider = Arc::new(ScriptedProvider::new());
    let tracking = TrackingConfig {
        bootstrap_timeout_ms: 2_000,
        ..TrackingConfig::default()
    };
    let pipeline = FixPipeline::new(provider.clone(), tracking);
    let started = Instant::now();

    assert_eq!(pipeline.bootstrap().await.unwrap(), BootstrapOutcome::TimedOut);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(10));
}

// ---------------------------------------------------------------------------
// Continuous
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn continuous_subscribes_once_and_forwards_fixes() {
    let provider = Arc::new(ScriptedProvider::new());
    let pipeline = pipeline(&provider);
    let stream = FixStream::new();
    let listener = stream.attach();
    let sink: Arc<dyn FixSink> = Arc::new(stream.clone());

    assert!(pipeline.start_continuous(sink.clone()).await.unwrap());
    assert!(!pipeline.start_continuous(sink).await.unwrap());
    assert_eq!(provider.subscribe_count(), 1);
    assert!(pipeline.is_streaming().await);

    let request = provider.requests.lock().unwrap()[0];
    assert_eq!(request.interval, Duration::from_secs(10));
    assert_eq!(request.min_interval, Duration::from_secs(5));

    assert_eq!(provider.push(fix(4.0)), 1);
    let event = tokio::time::timeout(Duration::from_secs(1), listener.events.recv_async())
        .await
        .expect("fix forwarded")
        .unwrap();
    assert_eq!(event, StreamEvent::Fix(fix(4.0).record()));
}

#[tokio::test(start_paused = true)]
async fn stop_continuous_unsubscribes_once() {
    let provider = Arc::new(ScriptedProvider::new());
    let pipeline = pipeline(&provider);
    pipeline.start_continuous(Arc::new(FixStream::new())).await.unwrap();

    assert!(pipeline.stop_continuous().await);
    assert!(!pipeline.stop_continuous().await);
    assert_eq!(provider.unsubscribe_count(), 1);
    assert!(!pipeline.is_streaming().await);
}

#[tokio::test(start_paused = true)]
async fn cancelled_stop_still_unsubscribes_once() {
    let provider = Arc::new(ScriptedProvider::new());
    *provider.unsubscribe_delay.lock().unwrap() = Some(Duration::from_secs(2));
    let pipeline = pipeline(&provider);
    pipeline.start_continuous(Arc::new(FixStream::new())).await.unwrap();

    let abandoned = tokio::time::timeout(Duration::from_millis(100), pipeline.stop_continuous()).await;
    assert!(abandoned.is_err());
    assert!(!pipeline.is_streaming().await);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(provider.unsubscribe_count(), 1);
    assert_eq!(provider.live_subscriptions(), 0);
}

#[tokio::test(start_paused = true)]
async fn closed_provider_stream_allows_resubscribe() {
    let provider = Arc::new(ScriptedProvider::new());
    let pipeline = pipeline(&provider);
    pipeline.start_continuous(Arc::new(FixStream::new())).await.unwrap();
    assert_eq!(provider.subscribe_count(), 1);

    provider.close_all();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!pipeline.is_streaming().await);

    assert!(pipeline.start_continuous(Arc::new(FixStream::new())).await.unwrap());
    assert_eq!(provider.subscribe_count(), 2);
    // The ended subscription was released before the new one was made.
    assert_eq!(provider.unsubscribe_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn continuous_permission_denied_is_reported() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.deny_subscriptions(ProviderError::PermissionDenied);
    let pipeline = pipeline(&provider);

    let err = pipeline.start_continuous(Arc::new(FixStream::new())).await.unwrap_err();
    assert_eq!(err, ProviderError::PermissionDenied);
    assert!(!pipeline.is_streaming().await);
}

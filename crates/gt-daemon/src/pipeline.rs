//! Fix pipeline: the continuous subscription and the one-shot bootstrap fetch.
//!
//! Continuous mode holds at most one provider subscription per process and
//! forwards every fix to a [`FixSink`] from a spawned task.
//!
//! Bootstrap mode answers "where is the device right now" without a
//! long-lived subscription: the cached last-known fix if the provider has
//! one, otherwise a single high-accuracy request raced against a timeout.
//! Whichever side of the race wins, the request is torn down exactly once.

use std::sync::Arc;
use std::time::Duration;

use gt_core::config::TrackingConfig;
use gt_core::types::Fix;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument, Span};

use crate::provider::{LocationProvider, ProviderError, SubscriptionId, UpdateRequest};

/// Receives fixes produced by the continuous subscription.
pub trait FixSink: Send + Sync {
    fn on_fix(&self, fix: Fix);
}

/// Result of a bootstrap fetch that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BootstrapOutcome {
    /// The provider's cached fix; no request was issued.
    Cached(Fix),
    /// A fresh fix that arrived before the timeout.
    Fresh(Fix),
    /// No fix arrived within the timeout.
    TimedOut,
}

impl BootstrapOutcome {
    pub fn fix(&self) -> Option<Fix> {
        match self {
            BootstrapOutcome::Cached(fix) | BootstrapOutcome::Fresh(fix) => Some(*fix),
            BootstrapOutcome::TimedOut => None,
        }
    }
}

struct ActiveStream {
    id: SubscriptionId,
    task: JoinHandle<()>,
}

pub struct FixPipeline {
    provider: Arc<dyn LocationProvider>,
    tracking: TrackingConfig,
    active: Mutex<Option<ActiveStream>>,
}

impl FixPipeline {
    pub fn new(provider: Arc<dyn LocationProvider>, tracking: TrackingConfig) -> Self {
        Self {
            provider,
            tracking,
            active: Mutex::new(None),
        }
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        self.tracking.bootstrap_timeout()
    }

    /// Subscribe to continuous updates and forward them to `sink`.
    ///
    /// Returns `Ok(false)` without touching the provider when a subscription
    /// is already streaming.
    pub async fn start_continuous(&self, sink: Arc<dyn FixSink>) -> Result<bool, ProviderError> {
        let mut active = self.active.lock().await;

        if let Some(stream) = active.as_ref() {
            if !stream.task.is_finished() {
                debug!(subscription_id = %stream.id, "continuous updates already active");
                return Ok(false);
            }
        }
        // The previous stream ended on the provider side; release its id.
        if let Some(ended) = active.take() {
            if let Err(e) = self.release_guard(ended.id).release().await {
                debug!(subscription_id = %ended.id, error = %e, "releasing ended subscription failed");
            }
        }

        let request = UpdateRequest::continuous(&self.tracking);
        let subscription = self.provider.subscribe(request).await?;
        let id = subscription.id;
        // Inherits the calling transition's span and its trace id.
        let task =
            tokio::spawn(forward_fixes(id, subscription.fixes, sink).instrument(Span::current()));
        *active = Some(ActiveStream { id, task });

        info!(
            subscription_id = %id,
            interval_ms = request.interval.as_millis() as u64,
            min_interval_ms = request.min_interval.as_millis() as u64,
            "started location updates"
        );
        Ok(true)
    }

    /// Tear down the continuous subscription. Returns `false` if none was active.
    pub async fn stop_continuous(&self) -> bool {
        let Some(stream) = self.active.lock().await.take() else {
            return false;
        };
        stream.task.abort();
        if let Err(e) = self.release_guard(stream.id).release().await {
            warn!(subscription_id = %stream.id, error = %e, "failed to remove location updates");
        }
        info!(subscription_id = %stream.id, "stopped location updates");
        true
    }

    pub async fn is_streaming(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|stream| !stream.task.is_finished())
    }

    fn release_guard(&self, id: SubscriptionId) -> SubscriptionGuard {
        SubscriptionGuard {
            provider: Arc::clone(&self.provider),
            id: Some(id),
        }
    }

    /// One-shot fetch: cached fix first, then a bounded fresh request.
    pub async fn bootstrap(&self) -> Result<BootstrapOutcome, ProviderError> {
        match self.provider.last_known().await {
            Ok(Some(fix)) => {
                debug!(lat = fix.latitude, lon = fix.longitude, "bootstrap served from last known fix");
                return Ok(BootstrapOutcome::Cached(fix));
            }
            Ok(None) => {}
            // A failing cache read is not fatal; the fresh request decides.
            Err(e) => debug!(error = %e, "last known fix unavailable"),
        }

        let subscription = self.provider.subscribe(UpdateRequest::single()).await?;
        // Released on every path, including this future being dropped mid-race.
        let request = self.release_guard(subscription.id);
        let timeout = self.bootstrap_timeout();

        let outcome = tokio::select! {
            received = subscription.fixes.recv_async() => match received {
                Ok(fix) => Ok(BootstrapOutcome::Fresh(fix)),
                Err(_) => Err(ProviderError::Closed),
            },
            _ = tokio::time::sleep(timeout) => Ok(BootstrapOutcome::TimedOut),
        };

        // Exactly one teardown, whichever branch won.
        if let Err(e) = request.release().await {
            warn!(subscription_id = %subscription.id, error = %e, "failed to cancel bootstrap request");
        }

        match &outcome {
            Ok(BootstrapOutcome::Fresh(fix)) => {
                info!(lat = fix.latitude, lon = fix.longitude, "bootstrap fetched fresh fix")
            }
            Ok(BootstrapOutcome::TimedOut) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "bootstrap fetch timed out")
            }
            Ok(BootstrapOutcome::Cached(_)) => {}
            Err(e) => warn!(error = %e, "bootstrap fetch failed"),
        }
        outcome
    }
}

/// Owns a provider subscription id until it is unsubscribed.
///
/// The unsubscribe always runs on its own task, so cancelling the future
/// that awaits `release` cannot interrupt it. A guard dropped while still
/// holding its id (the owning future was cancelled first) spawns the same
/// task. Either way each id is released exactly once.
struct SubscriptionGuard {
    provider: Arc<dyn LocationProvider>,
    id: Option<SubscriptionId>,
}

impl SubscriptionGuard {
    async fn release(mut self) -> Result<(), ProviderError> {
        let Some(id) = self.id.take() else {
            return Ok(());
        };
        let provider = Arc::clone(&self.provider);
        tokio::spawn(async move { provider.unsubscribe(id).await })
            .await
            .unwrap_or_else(|e| Err(ProviderError::Unavailable(format!("unsubscribe task failed: {e}"))))
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let provider = Arc::clone(&self.provider);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(subscription_id = %id, "releasing abandoned subscription");
                runtime.spawn(async move {
                    if let Err(e) = provider.unsubscribe(id).await {
                        warn!(subscription_id = %id, error = %e, "failed to release abandoned subscription");
                    }
                });
            }
            Err(_) => warn!(subscription_id = %id, "runtime gone, subscription not released"),
        }
    }
}

async fn forward_fixes(id: SubscriptionId, fixes: flume::Receiver<Fix>, sink: Arc<dyn FixSink>) {
    while let Ok(fix) = fixes.recv_async().await {
        sink.on_fix(fix);
    }
    debug!(subscription_id = %id, "provider closed fix stream");
}

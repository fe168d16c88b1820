//! Location provider capability.
//!
//! The positioning engine is an external collaborator. The daemon only sees
//! it through [`LocationProvider`]: a cached last-known fix, a subscription
//! that pushes fixes on a channel, and an explicit unsubscribe.
//!
//! [`SimulatedProvider`] stands in for a real engine when the daemon runs
//! headless. It walks a deterministic path around a configured origin.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gt_core::config::{SimulationConfig, TrackingConfig};
use gt_core::types::Fix;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Identifies one provider subscription for `unsubscribe`.
pub type SubscriptionId = Uuid;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Failures reported by the positioning engine.
///
/// None of these stop the tracking service; callers treat every variant as
/// "no fix available" and rely on the next interval or restart alarm.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The user or the OS revoked location access.
    #[error("location permission denied")]
    PermissionDenied,

    /// The engine is present but cannot serve the request right now.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider closed the fix channel before delivering a fix.
    #[error("fix stream closed by provider")]
    Closed,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    HighAccuracy,
    Balanced,
}

/// Parameters for a provider subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRequest {
    pub priority: Priority,
    /// Nominal spacing between fixes. Zero asks for a fix as soon as possible.
    pub interval: Duration,
    /// Fixes are never delivered closer together than this.
    pub min_interval: Duration,
}

impl UpdateRequest {
    /// The long-lived request used while the service runs in the foreground.
    pub fn continuous(tracking: &TrackingConfig) -> Self {
        Self {
            priority: Priority::HighAccuracy,
            interval: tracking.interval(),
            min_interval: tracking.min_interval(),
        }
    }

    /// A single high-accuracy fix, as fast as the engine can produce it.
    pub fn single() -> Self {
        Self {
            priority: Priority::HighAccuracy,
            interval: Duration::ZERO,
            min_interval: Duration::ZERO,
        }
    }

    /// Effective spacing honoured by providers: the larger of both bounds.
    pub fn effective_interval(&self) -> Duration {
        self.interval.max(self.min_interval)
    }
}

/// A live subscription: its id and the channel fixes arrive on.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub fixes: flume::Receiver<Fix>,
}

// ---------------------------------------------------------------------------
// LocationProvider
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// The engine's cached fix, returned without waiting for a new reading.
    async fn last_known(&self) -> Result<Option<Fix>, ProviderError>;

    /// Start pushing fixes for `request` until [`unsubscribe`](Self::unsubscribe).
    async fn subscribe(&self, request: UpdateRequest) -> Result<Subscription, ProviderError>;

    /// Stop a subscription. Unknown ids are ignored.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), ProviderError>;
}

// ---------------------------------------------------------------------------
// SimulatedProvider
// ---------------------------------------------------------------------------

const METERS_PER_DEGREE: f64 = 111_320.0;

/// Deterministic provider that circles a configured origin.
///
/// Single-fix requests (zero interval) are answered after one second, which
/// models a cold GPS acquisition.
pub struct SimulatedProvider {
    config: SimulationConfig,
    permission_granted: AtomicBool,
    step: Arc<AtomicU64>,
    last_fix: Arc<Mutex<Option<Fix>>>,
    active: Mutex<HashMap<SubscriptionId, JoinHandle<()>>>,
}

impl SimulatedProvider {
    pub fn new(config: SimulationConfig) -> Self {
        let seeded = config
            .seed_last_known
            .then(|| Fix::now(config.origin_lat, config.origin_lon, config.accuracy_m));
        Self {
            config,
            permission_granted: AtomicBool::new(true),
            step: Arc::new(AtomicU64::new(0)),
            last_fix: Arc::new(Mutex::new(seeded)),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Simulate the user granting or revoking location access.
    pub fn set_permission(&self, granted: bool) {
        self.permission_granted.store(granted, Ordering::SeqCst);
        info!(granted, "simulated location permission changed");
    }

    /// Number of subscriptions currently pushing fixes.
    pub fn active_subscriptions(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn check_permission(&self) -> Result<(), ProviderError> {
        if self.permission_granted.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProviderError::PermissionDenied)
        }
    }
}

/// Position `step` of a slow spiral around the origin.
fn walk(config: &SimulationConfig, step: u64) -> Fix {
    let angle = step as f64 * 0.7;
    let radius = config.jitter_m * ((step % 10) as f64 + 1.0) / 10.0;
    let north = radius * angle.sin();
    let east = radius * angle.cos();
    let lat = config.origin_lat + north / METERS_PER_DEGREE;
    let lon = config.origin_lon
        + east / (METERS_PER_DEGREE * config.origin_lat.to_radians().cos().max(0.01));
    Fix::now(lat, lon, config.accuracy_m)
}

#[async_trait]
impl LocationProvider for SimulatedProvider {
    async fn last_known(&self) -> Result<Option<Fix>, ProviderError> {
        self.check_permission()?;
        Ok(*self
            .last_fix
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    async fn subscribe(&self, request: UpdateRequest) -> Result<Subscription, ProviderError> {
        self.check_permission()?;

        let id = Uuid::new_v4();
        let (tx, rx) = flume::unbounded();
        let period = if request.interval.is_zero() {
            Duration::from_secs(1)
        } else {
            request.effective_interval()
        };
        let config = self.config.clone();
        let step = Arc::clone(&self.step);
        let last_fix = Arc::clone(&self.last_fix);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            if request.interval.is_zero() {
                // Cold start: no immediate fix for a single request.
                ticker.tick().await;
            }
            loop {
                ticker.tick().await;
                let fix = walk(&config, step.fetch_add(1, Ordering::Relaxed));
                *last_fix.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(fix);
                if tx.send_async(fix).await.is_err() {
                    break;
                }
            }
        });

        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, task);
        debug!(subscription_id = %id, period_ms = period.as_millis() as u64, "simulated subscription started");
        Ok(Subscription { id, fixes: rx })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), ProviderError> {
        let removed = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id);
        if let Some(task) = removed {
            task.abort();
            debug!(subscription_id = %id, "simulated subscription stopped");
        }
        Ok(())
    }
}

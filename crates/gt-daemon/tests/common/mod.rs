//! Test doubles shared by the gt-daemon integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gt_core::config::Config;
use gt_core::store::{IntentStore, MemoryIntentStore, StoreError};
use gt_core::types::{Fix, ScheduledAlarm, TrackingIntent};
use gt_daemon::host::{ForegroundNotice, HostError, ServiceHost};
use gt_daemon::provider::{LocationProvider, ProviderError, Subscription, SubscriptionId, UpdateRequest};
use gt_daemon::restart::{AlarmClock, AlarmError};
use gt_daemon::service::TrackingService;
use uuid::Uuid;

pub fn fix(lat: f64) -> Fix {
    Fix::new(lat, -122.08, 8.0, 1_700_000_000_000)
}

// ---------------------------------------------------------------------------
// ScriptedProvider
// ---------------------------------------------------------------------------

/// Provider whose behaviour is set up front by the test.
///
/// Single requests answer after `fresh_after` (never when `None`).
/// Continuous subscriptions only deliver what the test pushes.
#[derive(Default)]
pub struct ScriptedProvider {
    pub cached: Mutex<Option<Fix>>,
    pub last_known_error: Mutex<Option<ProviderError>>,
    pub subscribe_error: Mutex<Option<ProviderError>>,
    pub fresh_after: Mutex<Option<(Duration, Fix)>>,
    pub requests: Mutex<Vec<UpdateRequest>>,
    pub unsubscribed: Mutex<Vec<SubscriptionId>>,
    /// Simulated engine latency for `unsubscribe`.
    pub unsubscribe_delay: Mutex<Option<Duration>>,
    senders: Mutex<HashMap<SubscriptionId, flume::Sender<Fix>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cached(fix: Fix) -> Self {
        let provider = Self::default();
        *provider.cached.lock().unwrap() = Some(fix);
        provider
    }

    pub fn with_fresh_after(delay: Duration, fix: Fix) -> Self {
        let provider = Self::default();
        *provider.fresh_after.lock().unwrap() = Some((delay, fix));
        provider
    }

    pub fn deny_subscriptions(&self, error: ProviderError) {
        *self.subscribe_error.lock().unwrap() = Some(error);
    }

    pub fn subscribe_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribed.lock().unwrap().len()
    }

    pub fn live_subscriptions(&self) -> usize {
        self.senders.lock().unwrap().len()
    }

    /// Deliver `fix` on every live continuous subscription.
    pub fn push(&self, fix: Fix) -> usize {
        let senders = self.senders.lock().unwrap();
        senders.values().filter(|tx| tx.send(fix).is_ok()).count()
    }

    /// Close every live subscription from the provider side.
    pub fn close_all(&self) {
        self.senders.lock().unwrap().clear();
    }
}

#[async_trait]
impl LocationProvider for ScriptedProvider {
    async fn last_known(&self) -> Result<Option<Fix>, ProviderError> {
        if let Some(err) = self.last_known_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(*self.cached.lock().unwrap())
    }

    async fn subscribe(&self, request: UpdateRequest) -> Result<Subscription, ProviderError> {
        if let Some(err) = self.subscribe_error.lock().unwrap().clone() {
            return Err(err);
        }
        self.requests.lock().unwrap().push(request);
        let id = Uuid::new_v4();
        let (tx, rx) = flume::unbounded();

        if request.interval.is_zero() {
            if let Some((delay, fix)) = *self.fresh_after.lock().unwrap() {
                let tx = tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(fix);
                });
            }
        }
        self.senders.lock().unwrap().insert(id, tx);
        Ok(Subscription { id, fixes: rx })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), ProviderError> {
        let delay = *self.unsubscribe_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.unsubscribed.lock().unwrap().push(id);
        self.senders.lock().unwrap().remove(&id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingClock
// ---------------------------------------------------------------------------

/// Alarm clock that records calls and holds at most one live alarm.
pub struct RecordingClock {
    pub exact_granted: AtomicBool,
    /// Report exact as granted but refuse it on `set`.
    pub deny_exact_on_set: AtomicBool,
    pub sets: Mutex<Vec<ScheduledAlarm>>,
    pub cancels: AtomicUsize,
    live: Mutex<Option<ScheduledAlarm>>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self {
            exact_granted: AtomicBool::new(true),
            deny_exact_on_set: AtomicBool::new(false),
            sets: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
            live: Mutex::new(None),
        }
    }

    pub fn live(&self) -> Option<ScheduledAlarm> {
        *self.live.lock().unwrap()
    }

    pub fn set_count(&self) -> usize {
        self.sets.lock().unwrap().len()
    }
}

impl AlarmClock for RecordingClock {
    fn can_schedule_exact(&self) -> bool {
        self.exact_granted.load(Ordering::SeqCst)
    }

    fn set(&self, alarm: &ScheduledAlarm) -> Result<(), AlarmError> {
        if alarm.precision == gt_core::types::AlarmPrecision::Exact
            && self.deny_exact_on_set.load(Ordering::SeqCst)
        {
            return Err(AlarmError::ExactDenied);
        }
        self.sets.lock().unwrap().push(*alarm);
        *self.live.lock().unwrap() = Some(*alarm);
        Ok(())
    }

    fn cancel(&self) -> Result<(), AlarmError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        *self.live.lock().unwrap() = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FlakyStore
// ---------------------------------------------------------------------------

/// Memory store whose writes can be made to fail.
pub struct FlakyStore {
    pub inner: MemoryIntentStore,
    pub fail_saves: AtomicBool,
    pub fail_loads: AtomicBool,
    pub saves: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::with_intent(TrackingIntent::default())
    }

    pub fn with_intent(intent: TrackingIntent) -> Self {
        Self {
            inner: MemoryIntentStore::with_intent(intent),
            fail_saves: AtomicBool::new(false),
            fail_loads: AtomicBool::new(false),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn persisted(&self) -> TrackingIntent {
        self.inner.snapshot().unwrap_or_default()
    }
}

impl IntentStore for FlakyStore {
    fn load(&self) -> Result<TrackingIntent, StoreError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Io(io::Error::new(io::ErrorKind::Other, "read failed")));
        }
        self.inner.load()
    }

    fn save(&self, intent: &TrackingIntent) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io(io::Error::new(io::ErrorKind::Other, "disk full")));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(intent)
    }
}

// ---------------------------------------------------------------------------
// RecordingHost
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingHost {
    pub visible: AtomicBool,
    pub refuse: AtomicBool,
    pub enters: AtomicUsize,
    pub exits: AtomicUsize,
}

impl RecordingHost {
    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }
}

impl ServiceHost for RecordingHost {
    fn enter_foreground(&self, _notice: &ForegroundNotice) -> Result<(), HostError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(HostError::Foreground("not allowed from background".into()));
        }
        self.enters.fetch_add(1, Ordering::SeqCst);
        self.visible.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn exit_foreground(&self) {
        self.exits.fetch_add(1, Ordering::SeqCst);
        self.visible.store(false, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub service: Arc<TrackingService>,
    pub store: Arc<FlakyStore>,
    pub host: Arc<RecordingHost>,
    pub clock: Arc<RecordingClock>,
    pub provider: Arc<ScriptedProvider>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Config::default(), FlakyStore::new(), ScriptedProvider::new())
    }

    pub fn with_store(store: FlakyStore) -> Self {
        Self::build(Config::default(), store, ScriptedProvider::new())
    }

    pub fn build(config: Config, store: FlakyStore, provider: ScriptedProvider) -> Self {
        let store = Arc::new(store);
        let host = Arc::new(RecordingHost::default());
        let clock = Arc::new(RecordingClock::new());
        let provider = Arc::new(provider);
        let service = Arc::new(TrackingService::from_config(
            &config,
            store.clone(),
            host.clone(),
            clock.clone(),
            provider.clone(),
        ));
        Self {
            service,
            store,
            host,
            clock,
            provider,
        }
    }

    /// Id of the alarm the scheduler currently holds.
    pub fn armed_id(&self) -> Option<Uuid> {
        self.service.scheduler().armed().map(|alarm| alarm.id)
    }
}

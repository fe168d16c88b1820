//! The tracking service state machine.
//!
//! `Idle -> Starting -> ForegroundRunning -> Stopping -> Idle`
//!
//! Every transition (start, stop, alarm fire, boot, process resume) runs
//! under one async mutex, so transitions never interleave, and each one
//! persists the [`TrackingIntent`] before it is considered complete. The
//! in-memory intent is therefore always equal to the persisted record, and
//! [`TrackingService::status`] can answer from memory.
//!
//! Fix production (continuous stream, bootstrap fetch) runs outside the
//! mutex and reaches listeners through the [`FixStream`] slot.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gt_core::config::{Config, ManualStartPolicy};
use gt_core::store::{IntentStore, StoreError};
use gt_core::types::{Fix, ServiceState, TrackingIntent};
use gt_telemetry::spans::operation_span;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::fix_stream::{FixStream, FixSubscription};
use crate::host::{ForegroundNotice, HostError, ServiceHost};
use crate::pipeline::{BootstrapOutcome, FixPipeline, FixSink};
use crate::provider::{LocationProvider, ProviderError};
use crate::restart::{AlarmClock, RestartScheduler};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The transition did not happen because its persistence write failed.
    #[error("failed to persist tracking intent: {0}")]
    Persist(#[from] StoreError),

    #[error(transparent)]
    Foreground(#[from] HostError),
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub restart_delay: Duration,
    pub manual_start_policy: ManualStartPolicy,
    pub notice: ForegroundNotice,
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            restart_delay: config.restart.delay(),
            manual_start_policy: config.restart.manual_start_policy,
            notice: ForegroundNotice::from(&config.notification),
        }
    }
}

// ---------------------------------------------------------------------------
// TrackingService
// ---------------------------------------------------------------------------

struct ServiceInner {
    state: ServiceState,
    intent: TrackingIntent,
}

impl ServiceInner {
    fn set_state(&mut self, next: ServiceState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(&next) {
            warn!(from = ?self.state, to = ?next, "unexpected service state transition");
        }
        debug!(from = ?self.state, to = ?next, "service state changed");
        self.state = next;
    }
}

pub struct TrackingService {
    inner: Mutex<ServiceInner>,
    store: Arc<dyn IntentStore>,
    host: Arc<dyn ServiceHost>,
    scheduler: RestartScheduler,
    pipeline: FixPipeline,
    fixes: FixStream,
    settings: ServiceSettings,
}

impl TrackingService {
    /// Build the service and restore the persisted intent.
    ///
    /// This is the only place the intent is read eagerly; afterwards the
    /// in-memory copy is authoritative. An unreadable record is logged and
    /// replaced by the default intent on the next transition.
    pub fn new(
        settings: ServiceSettings,
        store: Arc<dyn IntentStore>,
        host: Arc<dyn ServiceHost>,
        clock: Arc<dyn AlarmClock>,
        pipeline: FixPipeline,
    ) -> Self {
        let intent = match store.load() {
            Ok(intent) => intent,
            Err(e) => {
                warn!(error = %e, "failed to read persisted tracking intent, using defaults");
                TrackingIntent::default()
            }
        };
        info!(
            is_running = intent.is_running,
            is_manually_stopped = intent.is_manually_stopped,
            "tracking intent restored"
        );
        Self {
            inner: Mutex::new(ServiceInner {
                state: ServiceState::Idle,
                intent,
            }),
            store,
            host,
            scheduler: RestartScheduler::new(clock),
            pipeline,
            fixes: FixStream::new(),
            settings,
        }
    }

    /// Convenience constructor wiring a pipeline from `config.tracking`.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn IntentStore>,
        host: Arc<dyn ServiceHost>,
        clock: Arc<dyn AlarmClock>,
        provider: Arc<dyn LocationProvider>,
    ) -> Self {
        let pipeline = FixPipeline::new(provider, config.tracking.clone());
        Self::new(ServiceSettings::from(config), store, host, clock, pipeline)
    }

    // ------------------------------------------------------------------
    // Control transitions
    // ------------------------------------------------------------------

    /// Start (or re-enter) foreground tracking.
    ///
    /// Idempotent while running: the notice is re-asserted and the restart
    /// alarm re-armed, but no second subscription is created.
    pub async fn start(&self, manual: bool) -> Result<(), ServiceError> {
        let span = operation_span("start");
        async {
            let mut inner = self.inner.lock().await;
            self.start_locked(&mut inner, manual).await
        }
        .instrument(span)
        .await
    }

    /// Stop tracking. A manual stop disables auto-restart until a later
    /// transition clears it; a non-manual stop never clears an earlier
    /// manual stop.
    pub async fn stop(&self, manual: bool) -> Result<(), ServiceError> {
        let span = operation_span("stop");
        async {
            let mut inner = self.inner.lock().await;
            self.stop_locked(&mut inner, manual).await
        }
        .instrument(span)
        .await
    }

    /// Whether tracking is running, per the (persisted) intent.
    pub async fn status(&self) -> bool {
        self.inner.lock().await.intent.is_running
    }

    pub async fn state(&self) -> ServiceState {
        self.inner.lock().await.state
    }

    pub async fn intent(&self) -> TrackingIntent {
        self.inner.lock().await.intent.clone()
    }

    // ------------------------------------------------------------------
    // Host signals
    // ------------------------------------------------------------------

    /// Restart-alarm entry point. Returns `true` if the service was started.
    ///
    /// The manual-stop guard reads the persisted record at fire time, since
    /// the user may have stopped tracking after the alarm was armed. The
    /// alarm is not re-armed here; the start transition does that.
    pub async fn handle_alarm_fired(&self, alarm_id: Uuid) -> Result<bool, ServiceError> {
        let span = operation_span("alarm_fired");
        async {
            let mut inner = self.inner.lock().await;
            if !self.scheduler.take_fired(alarm_id) {
                debug!(alarm_id = %alarm_id, "superseded restart alarm fired, ignoring");
                return Ok(false);
            }
            info!(alarm_id = %alarm_id, "restart alarm triggered");
            if self.persisted_intent(&inner).is_manually_stopped {
                info!("service was manually stopped, not restarting");
                return Ok(false);
            }
            self.start_locked(&mut inner, false).await?;
            Ok(true)
        }
        .instrument(span)
        .await
    }

    /// Boot-completed entry point, guarded like an alarm fire.
    pub async fn handle_boot_completed(&self) -> Result<bool, ServiceError> {
        let span = operation_span("boot_completed");
        async {
            let mut inner = self.inner.lock().await;
            if self.persisted_intent(&inner).is_manually_stopped {
                info!("device rebooted, tracking was manually stopped, staying idle");
                return Ok(false);
            }
            info!("device rebooted, restarting tracking");
            self.start_locked(&mut inner, false).await?;
            Ok(true)
        }
        .instrument(span)
        .await
    }

    /// Process (re)creation: resume if the intent says tracking was running
    /// when the previous process died.
    pub async fn handle_process_started(&self) -> Result<bool, ServiceError> {
        let span = operation_span("process_started");
        async {
            let mut inner = self.inner.lock().await;
            if !inner.intent.is_running || inner.state.is_running() {
                debug!(
                    is_running = inner.intent.is_running,
                    state = ?inner.state,
                    "nothing to resume"
                );
                return Ok(false);
            }
            info!("resuming tracking after process restart");
            self.start_locked(&mut inner, false).await?;
            Ok(true)
        }
        .instrument(span)
        .await
    }

    /// Wake entry point: one bootstrap fetch, forwarded to the listener.
    ///
    /// Runs outside the transition lock, so it never delays start/stop.
    pub async fn handle_wake(&self) -> Result<BootstrapOutcome, ProviderError> {
        let span = operation_span("wake");
        async {
            let outcome = self.pipeline.bootstrap().await?;
            if let Some(fix) = outcome.fix() {
                self.on_fix_produced(fix);
            }
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    // ------------------------------------------------------------------
    // Fix stream
    // ------------------------------------------------------------------

    /// Forward a fix to the attached listener, if any. Never fails.
    pub fn on_fix_produced(&self, fix: Fix) {
        self.fixes.on_fix(fix);
    }

    pub fn attach(&self) -> FixSubscription {
        self.fixes.attach()
    }

    pub fn detach(&self, listener_id: Uuid) -> bool {
        self.fixes.detach(listener_id)
    }

    pub fn scheduler(&self) -> &RestartScheduler {
        &self.scheduler
    }

    pub fn pipeline(&self) -> &FixPipeline {
        &self.pipeline
    }

    // ------------------------------------------------------------------
    // Internals (caller holds the transition lock)
    // ------------------------------------------------------------------

    async fn start_locked(&self, inner: &mut ServiceInner, manual: bool) -> Result<(), ServiceError> {
        let was_running = inner.state.is_running();
        info!(manual, was_running, is_manually_stopped = inner.intent.is_manually_stopped, "start requested");
        if !was_running {
            inner.set_state(ServiceState::Starting);
        }

        // Foreground first, ahead of any blocking work.
        if let Err(e) = self.host.enter_foreground(&self.settings.notice) {
            error!(error = %e, "host refused foreground mode");
            if !was_running {
                inner.set_state(ServiceState::Idle);
            }
            return Err(e.into());
        }

        let mut next = inner.intent.clone();
        next.is_running = true;
        if manual {
            next.is_manually_stopped = match self.settings.manual_start_policy {
                ManualStartPolicy::DisableAutoRestart => true,
                ManualStartPolicy::ResumeAutoRestart => false,
            };
        }
        if let Err(e) = self.persist(&mut next) {
            error!(error = %e, "start aborted, tracking intent not persisted");
            if !was_running {
                self.host.exit_foreground();
                inner.set_state(ServiceState::Idle);
            }
            return Err(e);
        }
        inner.intent = next;

        if inner.intent.allows_auto_restart() {
            if let Err(e) = self.scheduler.arm(self.settings.restart_delay) {
                error!(error = %e, "failed to schedule restart alarm");
            }
        } else {
            self.scheduler.cancel();
        }

        let sink: Arc<dyn FixSink> = Arc::new(self.fixes.clone());
        match self.pipeline.start_continuous(sink).await {
            Ok(_) => {}
            // Permission or engine trouble: stay up, the next restart retries.
            Err(e) => warn!(error = %e, "location updates unavailable"),
        }

        inner.set_state(ServiceState::ForegroundRunning);
        info!(is_manually_stopped = inner.intent.is_manually_stopped, "tracking service running");
        Ok(())
    }

    async fn stop_locked(&self, inner: &mut ServiceInner, manual: bool) -> Result<(), ServiceError> {
        let was_running = inner.state.is_running();
        info!(manual, was_running, "stop requested");

        let mut next = inner.intent.clone();
        next.is_running = false;
        if manual {
            next.is_manually_stopped = true;
        }

        if was_running {
            inner.set_state(ServiceState::Stopping);
        }
        if let Err(e) = self.persist(&mut next) {
            error!(error = %e, "stop aborted, tracking intent not persisted");
            if was_running {
                inner.set_state(ServiceState::ForegroundRunning);
            }
            return Err(e);
        }
        inner.intent = next;

        self.pipeline.stop_continuous().await;
        self.scheduler.cancel();
        self.fixes.end();
        if was_running {
            self.host.exit_foreground();
        }
        inner.set_state(ServiceState::Idle);
        info!(is_manually_stopped = inner.intent.is_manually_stopped, "tracking service stopped");
        Ok(())
    }

    fn persist(&self, intent: &mut TrackingIntent) -> Result<(), ServiceError> {
        intent.updated_at = Some(Utc::now());
        self.store.save(intent)?;
        Ok(())
    }

    /// Fresh read of the persisted record, falling back to memory.
    fn persisted_intent(&self, inner: &ServiceInner) -> TrackingIntent {
        match self.store.load() {
            Ok(intent) => intent,
            Err(e) => {
                warn!(error = %e, "failed to re-read tracking intent, using in-memory copy");
                inner.intent.clone()
            }
        }
    }
}

use std::sync::Arc;

use anyhow::{Context, Result};
use gt_core::config::Config;
use gt_core::store::{FileIntentStore, IntentStore};
use tracing::{info, warn};

use crate::control::ControlSurface;
use crate::host::{HeadlessHost, HostSignal, ServiceHost};
use crate::provider::LocationProvider;
use crate::restart::{AlarmClock, TokioAlarmClock};
use crate::service::TrackingService;
use crate::shutdown::ShutdownSignal;
use crate::signals::HostSignalLoop;

/// The background tracking daemon.
///
/// Owns the tracking service and the host signal channel, and runs the
/// signal loop until the `ShutdownSignal` is triggered (e.g. via ctrl-c).
pub struct Daemon {
    config: Config,
    service: Arc<TrackingService>,
    signal_tx: flume::Sender<HostSignal>,
    signal_rx: flume::Receiver<HostSignal>,
    shutdown: ShutdownSignal,
}

impl Daemon {
    /// Wire a daemon from config: file-backed intent store under
    /// `general.data_dir`, headless host, in-process restart alarms.
    pub fn new(config: Config, provider: Arc<dyn LocationProvider>) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        let store = FileIntentStore::new(&data_dir, &config.storage.namespace);
        info!(path = %store.path().display(), "tracking intent store");

        let (signal_tx, signal_rx) = flume::unbounded();
        let clock = TokioAlarmClock::new(
            signal_tx.clone(),
            config.restart.exact_alarms,
            config.restart.inexact_slack(),
        );
        Ok(Self::with_parts(
            config,
            Arc::new(store),
            Arc::new(HeadlessHost::new()),
            Arc::new(clock),
            provider,
            (signal_tx, signal_rx),
        ))
    }

    /// Assemble a daemon from explicit collaborators.
    ///
    /// `signals` must be the channel the alarm clock posts fires on.
    /// `ProcessStarted` is queued here, ahead of anything sent through
    /// [`Daemon::signal_sender`].
    pub fn with_parts(
        config: Config,
        store: Arc<dyn IntentStore>,
        host: Arc<dyn ServiceHost>,
        clock: Arc<dyn AlarmClock>,
        provider: Arc<dyn LocationProvider>,
        signals: (flume::Sender<HostSignal>, flume::Receiver<HostSignal>),
    ) -> Self {
        let service = Arc::new(TrackingService::from_config(&config, store, host, clock, provider));
        let (signal_tx, signal_rx) = signals;
        if signal_tx.send(HostSignal::ProcessStarted).is_err() {
            warn!("host signal channel closed before start");
        }
        Self {
            config,
            service,
            signal_tx,
            signal_rx,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Sender for host lifecycle signals (boot, wake, teardown, ...).
    pub fn signal_sender(&self) -> flume::Sender<HostSignal> {
        self.signal_tx.clone()
    }

    pub fn control(&self) -> ControlSurface {
        ControlSurface::new(Arc::clone(&self.service))
    }

    pub fn service(&self) -> &Arc<TrackingService> {
        &self.service
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a handle that can be used to trigger shutdown from another task.
    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    /// Run until shutdown (blocking).
    ///
    /// The queued `ProcessStarted` is handled before any other signal, so a
    /// daemon killed while tracking resumes first.
    pub async fn run(&self) -> Result<()> {
        info!("geotrack daemon running");

        HostSignalLoop::new(
            Arc::clone(&self.service),
            self.signal_rx.clone(),
            self.shutdown.clone(),
        )
        .run()
        .await;

        info!("geotrack daemon stopped");
        Ok(())
    }
}

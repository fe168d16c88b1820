use std::sync::Arc;

use gt_telemetry::spans::operation_span;
use tracing::{debug, error, info, warn, Instrument};

use crate::host::HostSignal;
use crate::service::TrackingService;
use crate::shutdown::ShutdownSignal;

/// Routes host lifecycle signals to service transitions until shutdown.
pub struct HostSignalLoop {
    service: Arc<TrackingService>,
    signals: flume::Receiver<HostSignal>,
    shutdown: ShutdownSignal,
}

impl HostSignalLoop {
    pub fn new(
        service: Arc<TrackingService>,
        signals: flume::Receiver<HostSignal>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            service,
            signals,
            shutdown,
        }
    }

    /// Run until shutdown is triggered or every sender is gone.
    pub async fn run(self) {
        let mut shutdown_rx = self.shutdown.subscribe();
        if self.shutdown.is_shutting_down() {
            return;
        }

        loop {
            tokio::select! {
                received = self.signals.recv_async() => match received {
                    Ok(signal) => self.dispatch(signal).await,
                    Err(_) => {
                        warn!("host signal channel closed, stopping signal loop");
                        break;
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received, stopping signal loop");
                    break;
                }
            }
        }
    }

    /// Apply one signal. Errors are logged; the loop keeps running.
    pub async fn dispatch(&self, signal: HostSignal) {
        debug!(?signal, "host signal received");
        let result = match signal {
            HostSignal::ProcessStarted => self.service.handle_process_started().await.map(drop),
            HostSignal::BootCompleted => self.service.handle_boot_completed().await.map(drop),
            HostSignal::AlarmFired { alarm_id } => {
                self.service.handle_alarm_fired(alarm_id).await.map(drop)
            }
            HostSignal::Teardown => self.service.stop(false).await,
            HostSignal::Wake => {
                // Bounded by the bootstrap timeout; keep the loop responsive.
                let service = Arc::clone(&self.service);
                let span = operation_span("wake_fetch");
                tokio::spawn(
                    async move {
                        if let Err(e) = service.handle_wake().await {
                            warn!(error = %e, "wake fetch produced no fix");
                        }
                    }
                    .instrument(span),
                );
                Ok(())
            }
        };
        if let Err(e) = result {
            error!(?signal, error = %e, "host signal handling failed");
        }
    }
}

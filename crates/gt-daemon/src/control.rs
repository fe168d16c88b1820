//! Control surface for a UI or CLI front end.
//!
//! Every call is fire-and-forget from the caller's point of view: failures
//! are logged and reported as `false`, never raised.

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::fix_stream::FixSubscription;
use crate::service::TrackingService;

#[derive(Clone)]
pub struct ControlSurface {
    service: Arc<TrackingService>,
}

impl ControlSurface {
    pub fn new(service: Arc<TrackingService>) -> Self {
        Self { service }
    }

    /// Start tracking as a plain (non-manual) request.
    pub async fn start_service(&self) -> bool {
        self.start(false).await
    }

    /// Start tracking as an explicit user action. Subject to the configured
    /// manual start policy.
    pub async fn start_service_manual(&self) -> bool {
        self.start(true).await
    }

    /// Stop tracking. `manual = true` disables auto-restart.
    pub async fn stop_service(&self, manual: bool) -> bool {
        match self.service.stop(manual).await {
            Ok(()) => {
                info!(manual, "tracking service stop requested");
                true
            }
            Err(e) => {
                error!(error = %e, manual, "failed to stop tracking service");
                false
            }
        }
    }

    /// Whether tracking is running, per the persisted intent.
    pub async fn check_service_alive(&self) -> bool {
        self.service.status().await
    }

    /// Attach the fix listener, replacing any previous one.
    pub fn attach_listener(&self) -> FixSubscription {
        self.service.attach()
    }

    pub fn detach_listener(&self, listener_id: Uuid) -> bool {
        self.service.detach(listener_id)
    }

    async fn start(&self, manual: bool) -> bool {
        match self.service.start(manual).await {
            Ok(()) => {
                info!(manual, "tracking service start requested");
                true
            }
            Err(e) => {
                error!(error = %e, manual, "failed to start tracking service");
                false
            }
        }
    }
}

//! Background Scheduler (C14): periodic JWT signing-key rotation and device
//! code cleanup, run the same way the teacher runs its webhook worker - a
//! ticking loop spawned once at startup, shut down cooperatively rather than
//! aborted.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;

use crate::config::AppState;

/// How often to check whether the active signing key needs rotating. The
/// actual rotation cadence is governed by `KeyManager::should_rotate`
/// (`key_rotation_interval_secs`); this just bounds how stale that check can
/// get.
const KEY_ROTATION_CHECK_INTERVAL_SECS: u64 = 3600;

pub struct RotationScheduler {
    state: AppState,
    device_cleanup_interval_secs: u64,
}

impl RotationScheduler {
    pub fn new(state: AppState) -> Self {
        let device_cleanup_interval_secs = state.config.device_flow.cleanup_interval_secs;
        Self { state, device_cleanup_interval_secs }
    }

    /// Runs until `shutdown` reports `true`. Both ticks fire independently;
    /// a failure in one pass is logged and the loop continues rather than
    /// exiting, since a transient database error shouldn't take the
    /// scheduler down for the process lifetime.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut key_ticker = interval(Duration::from_secs(KEY_ROTATION_CHECK_INTERVAL_SECS));
        let mut cleanup_ticker = interval(Duration::from_secs(self.device_cleanup_interval_secs.max(1)));

        tracing::info!(
            key_check_interval_secs = KEY_ROTATION_CHECK_INTERVAL_SECS,
            device_cleanup_interval_secs = self.device_cleanup_interval_secs,
            "rotation scheduler started"
        );

        loop {
            tokio::select! {
                _ = key_ticker.tick() => {
                    self.check_key_rotation().await;
                }
                _ = cleanup_ticker.tick() => {
                    self.cleanup_device_codes().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("rotation scheduler shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn check_key_rotation(&self) {
        if !self.state.keys.should_rotate().await {
            return;
        }
        match self.state.keys.rotate().await {
            Ok(()) => tracing::info!("rotated JWT signing key"),
            Err(e) => tracing::error!(error = %e, "JWT signing key rotation failed"),
        }
    }

    async fn cleanup_device_codes(&self) {
        match self.state.device_flow.cleanup_expired().await {
            Ok(count) if count > 0 => tracing::info!(count, "expired stale pending device codes"),
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "device code expiry sweep failed"),
        }
    }
}

//! Safety protocol: best-effort restoration toward a safe desktop state
//!
//! Invoked on engine stop, automation disable, and process exit. The latch
//! makes the restoration run exactly once even when several of those paths
//! fire together (explicit stop followed by the exit handler).

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::engine::SharedDrivers;

/// Idempotent exit-time restoration
pub struct SafetyProtocol {
    executed: AtomicBool,
}

impl SafetyProtocol {
    pub fn new() -> Self {
        Self {
            executed: AtomicBool::new(false),
        }
    }

    /// Whether the restoration has already run since the last re-arm
    pub fn has_executed(&self) -> bool {
        self.executed.load(Ordering::SeqCst)
    }

    /// Re-arm the latch; called when automation is (re-)enabled so a later
    /// stop restores again
    pub fn rearm(&self) {
        self.executed.store(false, Ordering::SeqCst);
    }

    /// Restore every driver toward the desktop state
    ///
    /// Steps run in fixed order, each one best-effort: pointer-speed reset,
    /// desktop DPI burst plus low poll rate, desktop vibrance across all
    /// displays. The drivers swallow and log their own I/O failures, so a
    /// failing step never prevents the following ones.
    pub async fn execute(&self, drivers: &SharedDrivers, desktop_vibrance: u8) {
        if self.executed.swap(true, Ordering::SeqCst) {
            debug!("Safety protocol already executed, skipping");
            return;
        }

        info!("Safety protocol: restoring defaults");
        let mut drivers = drivers.lock().await;

        drivers.pointer.reset();
        debug!("Safety protocol: pointer speed restored");

        drivers.mouse.apply_desktop_profile().await;
        debug!("Safety protocol: mouse hardware restored");

        // All displays, regardless of the single-monitor setting.
        drivers.gpu.set_vibrance(desktop_vibrance, false);
        debug!(level = desktop_vibrance, "Safety protocol: vibrance restored");

        if !drivers.mouse.connected() {
            warn!("Safety protocol ran without a mouse command channel");
        }
    }
}

impl Default for SafetyProtocol {
    fn default() -> Self {
        Self::new()
    }
}

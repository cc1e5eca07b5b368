//! OS pointer-speed driver and sensitivity translator
//!
//! Murqin mode raises hardware DPI for lower latency and jitter, then lowers
//! the OS pointer speed proportionally so the perceived cursor speed does not
//! change. The translator maps the required sensitivity multiplier onto the
//! fixed Windows pointer-speed table; the driver captures the user's original
//! speed at construction and restores exactly that value, never a hardcoded
//! default.

use tracing::{debug, info, warn};

use crate::engine::PointerBackend;

// ============================================================================
// Sensitivity table
// ============================================================================

/// Windows pointer-speed multipliers for indices 1..=20, monotonically
/// increasing
pub const SENSITIVITY_TABLE: [f64; 20] = [
    0.03125, 0.0625, 0.125, 0.25, 0.375, 0.5, 0.625, 0.75, 0.875, 1.0, 1.25, 1.5, 1.75, 2.0,
    2.25, 2.5, 2.75, 3.0, 3.25, 3.5,
];

/// Index of the 1.0x multiplier, the Windows default
pub const DEFAULT_SPEED_INDEX: u32 = 10;

/// Multiplier for a 1-based speed index (out-of-range indices clamp)
pub fn multiplier_for(index: u32) -> f64 {
    SENSITIVITY_TABLE[(index.clamp(1, 20) - 1) as usize]
}

/// Pick the speed index whose multiplier best compensates a raised hardware
/// DPI
///
/// The required multiplier is `base_dpi * table[base_index] / hardware_dpi`;
/// the result is the index with minimal absolute distance to it, ties broken
/// by the lowest index.
pub fn translate_index(base_dpi: u32, hardware_dpi: u32, base_index: u32) -> u32 {
    let base_index = if (1..=20).contains(&base_index) {
        base_index
    } else {
        DEFAULT_SPEED_INDEX
    };
    if hardware_dpi == 0 {
        return base_index;
    }

    let required = f64::from(base_dpi) * multiplier_for(base_index) / f64::from(hardware_dpi);

    let mut best_index = 1u32;
    let mut best_diff = f64::INFINITY;
    for (i, multiplier) in SENSITIVITY_TABLE.iter().enumerate() {
        let diff = (multiplier - required).abs();
        if diff < best_diff {
            best_diff = diff;
            best_index = i as u32 + 1;
        }
    }
    best_index
}

// ============================================================================
// Driver
// ============================================================================

/// OS-global pointer-speed driver
pub struct PointerSpeed {
    /// Speed captured at construction; the restoration target for the whole
    /// process lifetime
    default_speed: u32,
}

impl PointerSpeed {
    /// Capture the current OS pointer speed as the restoration target
    pub fn new() -> Self {
        let default_speed = read_speed().unwrap_or(DEFAULT_SPEED_INDEX);
        info!(default_speed, "Captured OS pointer speed");
        Self { default_speed }
    }

    /// The captured restoration target
    pub fn default_speed(&self) -> u32 {
        self.default_speed
    }
}

impl Default for PointerSpeed {
    fn default() -> Self {
        Self::new()
    }
}

impl PointerBackend for PointerSpeed {
    fn set_speed(&mut self, index: u32) {
        let index = index.clamp(1, 20);
        // Insufficient privilege is possible and non-fatal.
        if write_speed(index) {
            debug!(index, "OS pointer speed set");
        } else {
            warn!(index, "Failed to set OS pointer speed");
        }
    }

    fn apply_compensation(&mut self, base_dpi: u32, hardware_dpi: u32) {
        let index = translate_index(base_dpi, hardware_dpi, DEFAULT_SPEED_INDEX);
        info!(base_dpi, hardware_dpi, index, "Applying pointer-speed compensation");
        self.set_speed(index);
    }

    fn reset(&mut self) {
        debug!(default_speed = self.default_speed, "Restoring OS pointer speed");
        let target = self.default_speed;
        self.set_speed(target);
    }
}

// ============================================================================
// Platform access
// ============================================================================

#[cfg(windows)]
fn read_speed() -> Option<u32> {
    use std::ffi::c_void;
    use windows::Win32::UI::WindowsAndMessaging::{
        SystemParametersInfoA, SPI_GETMOUSESPEED, SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS,
    };

    unsafe {
        let mut speed: u32 = 0;
        SystemParametersInfoA(
            SPI_GETMOUSESPEED,
            0,
            Some(&mut speed as *mut _ as *mut c_void),
            SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS(0),
        )
        .ok()?;
        Some(speed)
    }
}

#[cfg(windows)]
fn write_speed(index: u32) -> bool {
    use std::ffi::c_void;
    use windows::Win32::UI::WindowsAndMessaging::{
        SystemParametersInfoA, SPIF_SENDCHANGE, SPIF_UPDATEINIFILE, SPI_SETMOUSESPEED,
    };

    unsafe {
        SystemParametersInfoA(
            SPI_SETMOUSESPEED,
            0,
            Some(index as usize as *mut c_void),
            SPIF_UPDATEINIFILE | SPIF_SENDCHANGE,
        )
        .is_ok()
    }
}

#[cfg(not(windows))]
fn read_speed() -> Option<u32> {
    None
}

#[cfg(not(windows))]
fn write_speed(_index: u32) -> bool {
    // No OS-global pointer speed to drive here; the operation degrades to a
    // silent no-op.
    true
}

// ============================================================================
// Tests
// ============================================================================

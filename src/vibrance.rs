//! NVAPI digital vibrance driver
//!
//! NVAPI exports no symbol table beyond `nvapi_QueryInterface`; every entry
//! point is resolved indirectly by a fixed numeric interface ID. The library
//! is loaded at runtime from the system directory matching the process
//! pointer width. Any failure along the way (library missing, interface
//! unresolved, init rejected) leaves the driver unavailable and every call a
//! no-op.

use libloading::Library;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::engine::VibranceBackend;

// ============================================================================
// Interface IDs
// ============================================================================

/// NvAPI_Initialize
pub const NVAPI_INITIALIZE_ID: u32 = 0x0150_E828;

/// NvAPI_EnumNvidiaDisplayHandle
pub const NVAPI_ENUM_DISPLAY_ID: u32 = 0x9ABD_D40D;

/// NvAPI_SetDVCLevel
pub const NVAPI_SET_DVC_ID: u32 = 0x1724_09B4;

/// Highest display slot probed during enumeration
const MAX_DISPLAY_SLOTS: i32 = 10;

/// Native DVC range is a signed -63..=63 around neutral
const NATIVE_DVC_MAX: i32 = 63;

// Resolved interfaces use the platform calling convention, matching how the
// vendor library is invoked on each pointer width.
type QueryInterfaceFn = unsafe extern "system" fn(u32) -> *mut c_void;
type InitializeFn = unsafe extern "system" fn() -> i32;
type EnumDisplayFn = unsafe extern "system" fn(i32, *mut i32) -> i32;
type SetDvcFn = unsafe extern "system" fn(i32, i32, i32) -> i32;

// ============================================================================
// Level mapping
// ============================================================================

/// Map a 0-100 vibrance level to the native signed DVC range
///
/// Centered linear transform: 50 is neutral, the extremes clamp to the
/// native limits.
pub fn level_to_native(level: u8) -> i32 {
    let centered = f64::from(level.min(100)) - 50.0;
    ((centered * 1.26).round() as i32).clamp(-NATIVE_DVC_MAX, NATIVE_DVC_MAX)
}

// ============================================================================
// Driver
// ============================================================================

/// NVAPI-backed vibrance driver
pub struct NvapiVibrance {
    // Keeps the vendor library mapped for the lifetime of the resolved
    // function pointers.
    _library: Option<Library>,
    set_dvc: Option<SetDvcFn>,
    displays: Vec<i32>,
    available: bool,
}

impl NvapiVibrance {
    /// Load the vendor library and enumerate displays
    ///
    /// Never fails: an unavailable GPU runtime produces a no-op driver.
    pub fn load() -> Self {
        match Self::try_load() {
            Ok(driver) => {
                info!(displays = driver.displays.len(), "NVAPI vibrance control ready");
                driver
            }
            Err(e) => {
                info!(error = %e, "NVAPI unavailable, vibrance control disabled");
                Self::unavailable()
            }
        }
    }

    /// A driver with no underlying runtime; every call is a no-op
    pub fn unavailable() -> Self {
        Self {
            _library: None,
            set_dvc: None,
            displays: Vec::new(),
            available: false,
        }
    }

    /// Library path for the current process pointer width
    fn library_path() -> PathBuf {
        let system_root =
            std::env::var("SystemRoot").unwrap_or_else(|_| r"C:\Windows".to_string());
        let dll = if cfg!(target_pointer_width = "64") {
            "nvapi64.dll"
        } else {
            "nvapi.dll"
        };
        Path::new(&system_root).join("System32").join(dll)
    }

    fn try_load() -> Result<Self, VibranceError> {
        let path = Self::library_path();
        if !path.exists() {
            return Err(VibranceError::LibraryNotFound(path));
        }

        let library = unsafe { Library::new(&path) }.map_err(VibranceError::LoadFailed)?;
        let query: QueryInterfaceFn = unsafe {
            *library
                .get(b"nvapi_QueryInterface\0")
                .map_err(VibranceError::LoadFailed)?
        };

        let initialize: InitializeFn = unsafe {
            let addr = query(NVAPI_INITIALIZE_ID);
            if addr.is_null() {
                return Err(VibranceError::InterfaceMissing("NvAPI_Initialize"));
            }
            std::mem::transmute::<*mut c_void, InitializeFn>(addr)
        };
        let enum_display: EnumDisplayFn = unsafe {
            let addr = query(NVAPI_ENUM_DISPLAY_ID);
            if addr.is_null() {
                return Err(VibranceError::InterfaceMissing(
                    "NvAPI_EnumNvidiaDisplayHandle",
                ));
            }
            std::mem::transmute::<*mut c_void, EnumDisplayFn>(addr)
        };
        let set_dvc: SetDvcFn = unsafe {
            let addr = query(NVAPI_SET_DVC_ID);
            if addr.is_null() {
                return Err(VibranceError::InterfaceMissing("NvAPI_SetDVCLevel"));
            }
            std::mem::transmute::<*mut c_void, SetDvcFn>(addr)
        };

        let status = unsafe { initialize() };
        if status != 0 {
            return Err(VibranceError::InitFailed(status));
        }

        let displays = Self::enumerate_displays(enum_display);

        Ok(Self {
            _library: Some(library),
            set_dvc: Some(set_dvc),
            displays,
            available: true,
        })
    }

    /// Probe display slots in order, stopping at the first failure
    fn enumerate_displays(enum_display: EnumDisplayFn) -> Vec<i32> {
        let mut displays = Vec::new();
        for slot in 0..MAX_DISPLAY_SLOTS {
            let mut handle: i32 = 0;
            let status = unsafe { enum_display(slot, &mut handle) };
            if status != 0 {
                break;
            }
            displays.push(handle);
        }
        debug!(count = displays.len(), "Enumerated NVIDIA display handles");
        displays
    }

    /// Enumerated display handle count
    pub fn display_count(&self) -> usize {
        self.displays.len()
    }
}

impl VibranceBackend for NvapiVibrance {
    fn available(&self) -> bool {
        self.available
    }

    fn set_vibrance(&self, level: u8, primary_only: bool) {
        if !self.available {
            return;
        }
        let Some(set_dvc) = self.set_dvc else {
            return;
        };

        let native = level_to_native(level);
        let targets: &[i32] = if primary_only {
            &self.displays[..self.displays.len().min(1)]
        } else {
            &self.displays
        };

        // Per-display errors are independent; one failing display must not
        // block the others.
        for &handle in targets {
            let status = unsafe { set_dvc(handle, 0, native) };
            if status != 0 {
                warn!(handle, status, "Failed to set vibrance on display");
            }
        }
        debug!(level, native, displays = targets.len(), "Vibrance applied");
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Vibrance driver error type
#[derive(Debug)]
pub enum VibranceError {
    /// Vendor library not present at the expected system path
    LibraryNotFound(PathBuf),
    /// Library load or symbol lookup failed
    LoadFailed(libloading::Error),
    /// A required interface ID resolved to null
    InterfaceMissing(&'static str),
    /// NvAPI_Initialize returned a non-zero status
    InitFailed(i32),
}

impl std::fmt::Display for VibranceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VibranceError::LibraryNotFound(path) => {
                write!(f, "NVAPI library not found at {}", path.display())
            }
            VibranceError::LoadFailed(e) => write!(f, "NVAPI load failed: {}", e),
            VibranceError::InterfaceMissing(name) => {
                write!(f, "NVAPI interface not resolved: {}", name)
            }
            VibranceError::InitFailed(status) => {
                write!(f, "NvAPI_Initialize failed with status {}", status)
            }
        }
    }
}

impl std::error::Error for VibranceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VibranceError::LoadFailed(e) => Some(e),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping_neutral_and_extremes() {
        assert_eq!(level_to_native(50), 0);
        assert_eq!(level_to_native(100), 63);
        assert_eq!(level_to_native(0), -63);
    }

    #[test]
    fn test_level_mapping_midpoints() {
        // 75 -> 25 * 1.26 = 31.5, rounds away from zero
        assert_eq!(level_to_native(75), 32);
        assert_eq!(level_to_native(25), -32);
        assert_eq!(level_to_native(51), 1);
        assert_eq!(level_to_native(49), -1);
    }

    #[test]
    fn test_level_mapping_clamps_input() {
        assert_eq!(level_to_native(255), 63);
    }

    #[test]
    fn test_unavailable_driver_is_a_noop() {
        let driver = NvapiVibrance::unavailable();
        assert!(!driver.available());
        assert_eq!(driver.display_count(), 0);
        driver.set_vibrance(100, false);
        driver.set_vibrance(0, true);
    }
}

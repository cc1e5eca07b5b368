//! gameshiftd Library
//!
//! Public API for testing and integration.

pub mod config;
pub mod engine;
pub mod focus;
pub mod mouse;
pub mod pointer;
pub mod safety;
pub mod vibrance;

/// Re-export commonly used types
pub use config::{
    load_shared_config, new_shared_config, spawn_config_watcher, Config, ConfigError, SharedConfig,
};
pub use engine::{
    is_game_sample, new_shared_drivers, Drivers, Engine, FocusSource, MouseBackend, PointerBackend,
    Profile, SharedDrivers, StatusSink, VibranceBackend, BASE_DPI, GAME_DPI, IDLE_PERIOD,
    POLL_PERIOD, REQUIRED_STABLE_TICKS,
};
pub use focus::{normalize_exe_name, ForegroundResolver};
pub use mouse::{MouseDriver, PRODUCT_ID, VENDOR_ID};
pub use pointer::{
    multiplier_for, translate_index, PointerSpeed, DEFAULT_SPEED_INDEX, SENSITIVITY_TABLE,
};
pub use safety::SafetyProtocol;
pub use vibrance::{level_to_native, NvapiVibrance, VibranceError};

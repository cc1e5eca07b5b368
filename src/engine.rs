//! Profile switching engine
//!
//! A debounced polling loop that samples the foreground process, classifies it
//! against the configured game list, and on a profile transition drives the
//! hardware backends in a fixed order: GPU vibrance, then the mouse DPI/rate
//! burst, then OS pointer-speed compensation.
//!
//! Backends are behind trait seams so tests can substitute recording fakes.
//! No backend failure may ever terminate the loop; the drivers are best-effort
//! and log their own errors.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use crate::config::{Config, SharedConfig};
use crate::safety::SafetyProtocol;

// ============================================================================
// Constants
// ============================================================================

/// Reference DPI the OS pointer-speed compensation is computed against
pub const BASE_DPI: u32 = 800;

/// Hardware DPI applied by the game profile
pub const GAME_DPI: u32 = 1600;

/// Poll cadence while automation is enabled
pub const POLL_PERIOD: Duration = Duration::from_millis(500);

/// Coarser sleep while automation is disabled, to avoid burning CPU
pub const IDLE_PERIOD: Duration = Duration::from_secs(1);

/// Consecutive identical samples required before a transition may fire
///
/// Absorbs alt-tab flicker: roughly one second of stable focus at the poll
/// cadence before any hardware command is issued.
pub const REQUIRED_STABLE_TICKS: u32 = 2;

/// Status label reported when the game profile is committed
pub const LABEL_GAME: &str = "GAME MODE ACTIVE";

/// Suffix appended to the game label when murqin compensation was applied
pub const LABEL_MURQIN_SUFFIX: &str = " (MURQIN)";

/// Status label reported when the desktop profile is committed
pub const LABEL_DESKTOP: &str = "DESKTOP MODE";

/// Status label reported when automation is stopped
pub const LABEL_IDLE: &str = "SYSTEM IDLE";

// ============================================================================
// Profile state
// ============================================================================

/// The active hardware configuration state
///
/// `Unknown` is the only legal initial state and is re-entered when automation
/// is stopped, forcing the next evaluation to treat the transition as novel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Unknown,
    Desktop,
    Game,
}

// ============================================================================
// Backend trait seams
// ============================================================================

/// Source of foreground focus samples
pub trait FocusSource: Send {
    /// Executable name of the focused process, lowercased, no path.
    /// Empty string on any failure.
    fn sample(&mut self) -> String;
}

/// Mouse protocol backend (DPI burst + poll rate commands)
#[async_trait]
pub trait MouseBackend: Send {
    /// Whether a command channel is open
    fn connected(&self) -> bool;
    /// Game DPI burst, settle delay, high poll rate. No-op when disconnected.
    async fn apply_game_profile(&mut self);
    /// Desktop DPI burst, settle delay, low poll rate. No-op when disconnected.
    async fn apply_desktop_profile(&mut self);
}

/// GPU vibrance backend
pub trait VibranceBackend: Send {
    /// Whether the vendor runtime was loaded and initialized
    fn available(&self) -> bool;
    /// Apply a vibrance level (0-100) to the first or all enumerated displays
    fn set_vibrance(&self, level: u8, primary_only: bool);
}

/// OS pointer-speed backend
pub trait PointerBackend: Send {
    /// Write the OS pointer-speed index (clamped to 1-20)
    fn set_speed(&mut self, index: u32);
    /// Lower pointer speed proportionally to the raised hardware DPI
    fn apply_compensation(&mut self, base_dpi: u32, hardware_dpi: u32);
    /// Restore the pointer speed captured at startup
    fn reset(&mut self);
}

/// The three hardware backends, owned as one unit
///
/// Shared between the engine worker and the safety protocol; the mutex
/// serializes an exit-time restoration against an in-flight transition.
pub struct Drivers {
    pub mouse: Box<dyn MouseBackend>,
    pub gpu: Box<dyn VibranceBackend>,
    pub pointer: Box<dyn PointerBackend>,
}

/// Shared driver handles
pub type SharedDrivers = Arc<Mutex<Drivers>>;

/// Bundle concrete backends into a shared driver set
pub fn new_shared_drivers(
    mouse: Box<dyn MouseBackend>,
    gpu: Box<dyn VibranceBackend>,
    pointer: Box<dyn PointerBackend>,
) -> SharedDrivers {
    Arc::new(Mutex::new(Drivers { mouse, gpu, pointer }))
}

/// Status sink callback: human-readable mode label and an "is active" flag.
/// Invoked on the polling thread; must not block.
pub type StatusSink = Box<dyn Fn(&str, bool) + Send>;

// ============================================================================
// Classification
// ============================================================================

/// Whether the sample matches any configured game name
///
/// Substring match, not exact: a configured short name matches variant
/// executable names. This is a known loose-matching policy (a configured
/// "war" also matches "software.exe") kept deliberately; do not tighten to
/// exact match. Case never affects the result.
pub fn is_game_sample(sample: &str, games: &[String]) -> bool {
    if sample.is_empty() {
        return false;
    }
    let sample = sample.to_lowercase();
    games
        .iter()
        .any(|g| !g.is_empty() && sample.contains(&g.to_lowercase()))
}

// ============================================================================
// Engine
// ============================================================================

/// The profile switching engine
pub struct Engine {
    config: SharedConfig,
    drivers: SharedDrivers,
    focus: Box<dyn FocusSource>,
    safety: Arc<SafetyProtocol>,
    enabled: Arc<AtomicBool>,
    sink: Option<StatusSink>,

    profile: Profile,
    last_sample: String,
    stable_count: u32,
}

impl Engine {
    /// Create a new engine; automation starts enabled
    pub fn new(
        config: SharedConfig,
        drivers: SharedDrivers,
        focus: Box<dyn FocusSource>,
        safety: Arc<SafetyProtocol>,
    ) -> Self {
        Self {
            config,
            drivers,
            focus,
            safety,
            enabled: Arc::new(AtomicBool::new(true)),
            sink: None,
            profile: Profile::Unknown,
            last_sample: String::new(),
            stable_count: 0,
        }
    }

    /// Install the status sink
    pub fn set_status_sink(&mut self, sink: StatusSink) {
        self.sink = Some(sink);
    }

    /// Handle for toggling automation from outside the worker
    pub fn enabled_handle(&self) -> Arc<AtomicBool> {
        self.enabled.clone()
    }

    /// Current profile
    pub fn profile(&self) -> Profile {
        self.profile
    }

    fn notify(&self, label: &str, active: bool) {
        if let Some(sink) = &self.sink {
            sink(label, active);
        }
    }

    fn config_snapshot(&self) -> Config {
        self.config.read().expect("config lock poisoned").clone()
    }

    /// Run the polling loop forever
    ///
    /// Enabling re-arms the safety protocol and resets the debounce state;
    /// disabling commits `Profile::Unknown` and runs the restoration once.
    pub async fn run(mut self) {
        let mut was_enabled = false;

        loop {
            let enabled = self.enabled.load(Ordering::SeqCst);

            if enabled && !was_enabled {
                info!("Automation enabled");
                self.safety.rearm();
                self.profile = Profile::Unknown;
                self.last_sample.clear();
                self.stable_count = 0;
            }
            if !enabled {
                if was_enabled {
                    self.stop().await;
                }
                was_enabled = false;
                sleep(IDLE_PERIOD).await;
                continue;
            }
            was_enabled = true;

            self.tick().await;
            sleep(POLL_PERIOD).await;
        }
    }

    /// One evaluation of the transition rule
    ///
    /// Split from [`run`] so tests can drive the state machine without the
    /// poll timer.
    pub async fn tick(&mut self) {
        let sample = self.focus.sample();

        // Debounce gate: a focus change resets the stability counter and the
        // tick takes no action until the sample has repeated.
        if sample != self.last_sample {
            self.stable_count = 0;
            self.last_sample = sample;
            return;
        }
        self.stable_count += 1;
        if self.stable_count < REQUIRED_STABLE_TICKS {
            return;
        }

        let cfg = self.config_snapshot();
        let is_game = is_game_sample(&self.last_sample, &cfg.games);

        if is_game {
            if self.profile != Profile::Game {
                debug!(exe = %self.last_sample, "Stable game focus, entering game profile");
                let murqin = self.apply_game_transition(&cfg).await;
                self.profile = Profile::Game;
                let label = if murqin {
                    format!("{}{}", LABEL_GAME, LABEL_MURQIN_SUFFIX)
                } else {
                    LABEL_GAME.to_string()
                };
                info!(exe = %self.last_sample, "{}", label);
                self.notify(&label, true);
            }
        } else if self.profile != Profile::Desktop {
            debug!(exe = %self.last_sample, "Stable non-game focus, entering desktop profile");
            self.apply_desktop_transition(&cfg).await;
            self.profile = Profile::Desktop;
            info!("{}", LABEL_DESKTOP);
            self.notify(LABEL_DESKTOP, false);
        }
        // Already in the target profile: no hardware calls this tick.
    }

    /// Apply the game profile in fixed order; returns whether murqin
    /// compensation was applied
    async fn apply_game_transition(&mut self, cfg: &Config) -> bool {
        let mut drivers = self.drivers.lock().await;
        drivers
            .gpu
            .set_vibrance(cfg.game_vibrance, cfg.single_monitor_only);
        drivers.mouse.apply_game_profile().await;
        if cfg.murqin_mode {
            drivers.pointer.apply_compensation(BASE_DPI, GAME_DPI);
        }
        cfg.murqin_mode
    }

    /// Apply the desktop profile in fixed order
    async fn apply_desktop_transition(&mut self, cfg: &Config) {
        let mut drivers = self.drivers.lock().await;
        drivers
            .gpu
            .set_vibrance(cfg.desktop_vibrance, cfg.single_monitor_only);
        drivers.mouse.apply_desktop_profile().await;
        drivers.pointer.reset();
    }

    /// Stop automation: force `Profile::Unknown` and restore the desktop
    /// state through the safety protocol
    pub async fn stop(&mut self) {
        info!("Automation stopped");
        self.profile = Profile::Unknown;
        self.last_sample.clear();
        self.stable_count = 0;

        let desktop_vibrance = self.config_snapshot().desktop_vibrance;
        self.safety.execute(&self.drivers, desktop_vibrance).await;
        self.notify(LABEL_IDLE, false);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::new_shared_config;
    use std::sync::Mutex as StdMutex;

    /// Shared call log recording every hardware call in order
    type CallLog = Arc<StdMutex<Vec<String>>>;

    struct FakeMouse {
        log: CallLog,
    }

    #[async_trait]
    impl MouseBackend for FakeMouse {
        fn connected(&self) -> bool {
            true
        }
        async fn apply_game_profile(&mut self) {
            self.log.lock().unwrap().push("mouse:game".to_string());
        }
        async fn apply_desktop_profile(&mut self) {
            self.log.lock().unwrap().push("mouse:desktop".to_string());
        }
    }

    struct FakeGpu {
        log: CallLog,
    }

    impl VibranceBackend for FakeGpu {
        fn available(&self) -> bool {
            true
        }
        fn set_vibrance(&self, level: u8, primary_only: bool) {
            self.log
                .lock()
                .unwrap()
                .push(format!("gpu:{}:{}", level, primary_only));
        }
    }

    struct FakePointer {
        log: CallLog,
    }

    impl PointerBackend for FakePointer {
        fn set_speed(&mut self, index: u32) {
            self.log.lock().unwrap().push(format!("pointer:set:{}", index));
        }
        fn apply_compensation(&mut self, base_dpi: u32, hardware_dpi: u32) {
            self.log
                .lock()
                .unwrap()
                .push(format!("pointer:comp:{}:{}", base_dpi, hardware_dpi));
        }
        fn reset(&mut self) {
            self.log.lock().unwrap().push("pointer:reset".to_string());
        }
    }

    struct ScriptedFocus {
        samples: Vec<String>,
        pos: usize,
    }

    impl ScriptedFocus {
        fn new(samples: &[&str]) -> Self {
            Self {
                samples: samples.iter().map(|s| s.to_string()).collect(),
                pos: 0,
            }
        }
    }

    impl FocusSource for ScriptedFocus {
        fn sample(&mut self) -> String {
            let sample = self
                .samples
                .get(self.pos)
                .cloned()
                .unwrap_or_else(|| self.samples.last().cloned().unwrap_or_default());
            self.pos += 1;
            sample
        }
    }

    fn engine_with(samples: &[&str], games: &[&str], murqin: bool) -> (Engine, CallLog) {
        let log: CallLog = Arc::new(StdMutex::new(Vec::new()));
        let config = new_shared_config();
        {
            let mut guard = config.write().unwrap();
            guard.games = games.iter().map(|g| g.to_string()).collect();
            guard.murqin_mode = murqin;
        }
        let drivers = new_shared_drivers(
            Box::new(FakeMouse { log: log.clone() }),
            Box::new(FakeGpu { log: log.clone() }),
            Box::new(FakePointer { log: log.clone() }),
        );
        let engine = Engine::new(
            config,
            drivers,
            Box::new(ScriptedFocus::new(samples)),
            Arc::new(SafetyProtocol::new()),
        );
        (engine, log)
    }

    #[test]
    fn test_classification_substring_and_case() {
        let games = vec!["game.exe".to_string()];
        assert!(is_game_sample("game.exe", &games));
        assert!(is_game_sample("GAME.EXE", &games));
        assert!(is_game_sample("mygame.exe64", &games));
        assert!(!is_game_sample("chrome.exe", &games));
        assert!(!is_game_sample("", &games));

        // Known loose-matching policy: short names can false-positive
        let games = vec!["war".to_string()];
        assert!(is_game_sample("software.exe", &games));
        assert!(is_game_sample("warframe.x64.exe", &games));
    }

    #[tokio::test]
    async fn test_no_transition_before_two_stable_samples() {
        let (mut engine, log) = engine_with(&["game.exe", "game.exe"], &["game.exe"], false);

        engine.tick().await; // change from "" -> reset
        engine.tick().await; // stable_count = 1, still gated
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(engine.profile(), Profile::Unknown);
    }

    #[tokio::test]
    async fn test_game_transition_fires_on_fourth_sample() {
        let samples = ["chrome.exe", "game.exe", "game.exe", "game.exe"];
        let (mut engine, log) = engine_with(&samples, &["game.exe"], false);

        engine.tick().await;
        engine.tick().await;
        engine.tick().await;
        assert!(log.lock().unwrap().is_empty());

        engine.tick().await;
        assert_eq!(engine.profile(), Profile::Game);
        let calls = log.lock().unwrap().clone();
        assert_eq!(calls, vec!["gpu:100:true".to_string(), "mouse:game".to_string()]);
    }

    #[tokio::test]
    async fn test_non_game_never_transitions_to_game() {
        let samples = ["chrome.exe", "chrome.exe", "chrome.exe"];
        let (mut engine, log) = engine_with(&samples, &["game.exe"], false);

        for _ in 0..3 {
            engine.tick().await;
        }
        // Settles into the desktop profile, never the game profile
        assert_eq!(engine.profile(), Profile::Desktop);
        let calls = log.lock().unwrap().clone();
        assert!(calls.iter().all(|c| !c.contains("game")));
    }

    #[tokio::test]
    async fn test_fixed_apply_order_with_murqin() {
        let samples = ["game.exe", "game.exe", "game.exe"];
        let (mut engine, log) = engine_with(&samples, &["game.exe"], true);

        for _ in 0..3 {
            engine.tick().await;
        }
        let calls = log.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "gpu:100:true".to_string(),
                "mouse:game".to_string(),
                "pointer:comp:800:1600".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_no_redundant_calls_when_profile_unchanged() {
        let samples = ["game.exe"; 8];
        let (mut engine, log) = engine_with(&samples, &["game.exe"], false);

        for _ in 0..8 {
            engine.tick().await;
        }
        // Exactly one transition's worth of hardware calls
        assert_eq!(log.lock().unwrap().len(), 2);
        assert_eq!(engine.profile(), Profile::Game);
    }

    #[tokio::test]
    async fn test_desktop_transition_resets_pointer() {
        let samples = [
            "game.exe",
            "game.exe",
            "game.exe",
            "chrome.exe",
            "chrome.exe",
            "chrome.exe",
        ];
        let (mut engine, log) = engine_with(&samples, &["game.exe"], true);

        for _ in 0..6 {
            engine.tick().await;
        }
        assert_eq!(engine.profile(), Profile::Desktop);
        let calls = log.lock().unwrap().clone();
        let desktop_calls = &calls[3..];
        assert_eq!(
            desktop_calls,
            &[
                "gpu:50:true".to_string(),
                "mouse:desktop".to_string(),
                "pointer:reset".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_stop_forces_unknown_and_restores_once() {
        let samples = ["game.exe", "game.exe", "game.exe"];
        let (mut engine, log) = engine_with(&samples, &["game.exe"], false);

        for _ in 0..3 {
            engine.tick().await;
        }
        assert_eq!(engine.profile(), Profile::Game);
        log.lock().unwrap().clear();

        engine.stop().await;
        assert_eq!(engine.profile(), Profile::Unknown);
        let restore = log.lock().unwrap().clone();
        assert_eq!(
            restore,
            vec![
                "pointer:reset".to_string(),
                "mouse:desktop".to_string(),
                "gpu:50:false".to_string(),
            ]
        );

        // A second stop is latched out: no further hardware calls
        engine.stop().await;
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_through_run_loop_restores_once() {
        let (engine, log) = engine_with(&["game.exe"], &["game.exe"], false);
        let enabled = engine.enabled_handle();
        let worker = tokio::spawn(engine.run());

        // A few poll periods of stable game focus commit the game profile
        sleep(Duration::from_secs(3)).await;
        assert!(log
            .lock()
            .unwrap()
            .contains(&"mouse:game".to_string()));

        enabled.store(false, Ordering::SeqCst);
        sleep(Duration::from_secs(3)).await;

        let calls = log.lock().unwrap().clone();
        let resets = calls.iter().filter(|c| *c == "pointer:reset").count();
        assert_eq!(resets, 1);
        assert!(calls.contains(&"mouse:desktop".to_string()));

        worker.abort();
    }

    #[tokio::test]
    async fn test_alt_tab_flicker_is_absorbed() {
        // Rapid alternation never yields two consecutive identical samples
        let samples = [
            "game.exe",
            "chrome.exe",
            "game.exe",
            "chrome.exe",
            "game.exe",
            "chrome.exe",
        ];
        let (mut engine, log) = engine_with(&samples, &["game.exe"], false);

        for _ in 0..6 {
            engine.tick().await;
        }
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(engine.profile(), Profile::Unknown);
    }
}

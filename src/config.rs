//! Configuration management for gameshiftd
//!
//! Handles loading, validation, and hot-reload of the JSON configuration file.
//! Configuration is stored at `<config_dir>/gameshift/config.json` and is
//! edited by external tooling; the daemon only reads it.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

// ============================================================================
// Constants
// ============================================================================

/// Default config directory name
const CONFIG_DIR: &str = "gameshift";

/// Default config file name
const CONFIG_FILE: &str = "config.json";

/// Default desktop vibrance level (0-100)
const DEFAULT_DESKTOP_VIBRANCE: u8 = 50;

/// Default game vibrance level (0-100)
const DEFAULT_GAME_VIBRANCE: u8 = 100;

// ============================================================================
// Main Configuration
// ============================================================================

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Executable names that count as games (substring match, lowercased)
    #[serde(default)]
    pub games: Vec<String>,

    /// Vibrance level applied in desktop mode (0-100)
    #[serde(default = "default_desktop_vibrance")]
    pub desktop_vibrance: u8,

    /// Vibrance level applied in game mode (0-100)
    #[serde(default = "default_game_vibrance")]
    pub game_vibrance: u8,

    /// Apply vibrance only to the first enumerated display
    #[serde(default = "default_true")]
    pub single_monitor_only: bool,

    /// Murqin mode: compensate OS pointer speed against the raised game DPI
    #[serde(default)]
    pub murqin_mode: bool,

    /// Configuration file path (not serialized)
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

fn default_desktop_vibrance() -> u8 {
    DEFAULT_DESKTOP_VIBRANCE
}

fn default_game_vibrance() -> u8 {
    DEFAULT_GAME_VIBRANCE
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            games: Vec::new(),
            desktop_vibrance: DEFAULT_DESKTOP_VIBRANCE,
            game_vibrance: DEFAULT_GAME_VIBRANCE,
            single_monitor_only: true,
            murqin_mode: false,
            config_path: None,
        }
    }
}

impl Config {
    /// Get the default config directory path
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(CONFIG_DIR))
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|p| p.join(CONFIG_FILE))
    }

    /// Validate and clamp all values
    ///
    /// Vibrance levels are clamped to 0-100 and game names are normalized to
    /// lowercase with surrounding whitespace removed. Empty names are dropped.
    pub fn validate(&mut self) {
        self.desktop_vibrance = self.desktop_vibrance.min(100);
        self.game_vibrance = self.game_vibrance.min(100);
        self.games = self
            .games
            .iter()
            .map(|g| g.trim().to_lowercase())
            .filter(|g| !g.is_empty())
            .collect();
    }

    /// Load configuration from the default location
    ///
    /// Returns default config if the file doesn't exist.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_config_path() {
            Some(path) => Self::load(&path),
            None => {
                tracing::warn!("Could not determine config directory, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from file path
    ///
    /// Returns default config if the file doesn't exist. Two on-disk shapes
    /// are accepted: the current object form, and the legacy form where the
    /// file is a bare JSON array of game names.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            let mut config = Self::default();
            config.config_path = Some(path.to_path_buf());
            return Ok(config);
        }

        let contents = fs::read_to_string(path).map_err(ConfigError::IoError)?;
        let mut config = Self::parse(&contents)?;

        config.validate();
        config.config_path = Some(path.to_path_buf());

        tracing::info!(
            path = %path.display(),
            games = config.games.len(),
            desktop_vibrance = config.desktop_vibrance,
            game_vibrance = config.game_vibrance,
            murqin_mode = config.murqin_mode,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Parse configuration from a JSON string, accepting the legacy
    /// bare-array-of-games shape
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        if let Ok(games) = serde_json::from_str::<Vec<String>>(contents) {
            return Ok(Self {
                games,
                ..Self::default()
            });
        }
        serde_json::from_str(contents).map_err(ConfigError::ParseError)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = match &self.config_path {
            Some(p) => p.clone(),
            None => Self::default_config_path()
                .ok_or_else(|| ConfigError::ValidationError("No config path".to_string()))?,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::IoError)?;
        }

        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::ParseError)?;
        fs::write(&path, contents).map_err(ConfigError::IoError)?;

        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }
}

// ============================================================================
// Shared Config (for hot-reload)
// ============================================================================

/// Thread-safe shared configuration for hot-reload support
///
/// The engine clones a snapshot once per tick so an external edit can never
/// tear the game set mid-read.
pub type SharedConfig = Arc<RwLock<Config>>;

/// Create a new shared config with defaults
pub fn new_shared_config() -> SharedConfig {
    Arc::new(RwLock::new(Config::default()))
}

/// Create a new shared config from file (or defaults if the file doesn't exist)
pub fn load_shared_config(path: Option<&Path>) -> Result<SharedConfig, ConfigError> {
    let config = match path {
        Some(p) => Config::load(p)?,
        None => Config::load_default()?,
    };
    Ok(Arc::new(RwLock::new(config)))
}

/// Watch the config file and reload the shared slot when it changes
///
/// Returns the watcher handle; dropping it stops watching. A reload failure
/// (mid-save, transient editor noise) keeps the previous snapshot.
pub fn spawn_config_watcher(
    shared: SharedConfig,
) -> Result<notify::RecommendedWatcher, ConfigError> {
    use notify::{Event, EventKind, RecursiveMode, Watcher};

    let path = {
        let guard = shared.read().expect("config lock poisoned");
        match &guard.config_path {
            Some(p) => p.clone(),
            None => {
                return Err(ConfigError::ValidationError(
                    "No config path to watch".to_string(),
                ))
            }
        }
    };

    // Watch the parent directory; editors replace the file rather than
    // writing into it, which drops a watch on the file itself.
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| ConfigError::ValidationError("Config path has no parent".to_string()))?;

    let watched = path.clone();
    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "Config watch error");
                return;
            }
        };

        if !matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        ) {
            return;
        }
        if !event.paths.iter().any(|p| p == &watched) {
            return;
        }

        match Config::load(&watched) {
            Ok(new_config) => {
                let mut guard = shared.write().expect("config lock poisoned");
                *guard = new_config;
                tracing::info!("Configuration reloaded");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Config reload failed, keeping previous snapshot");
            }
        }
    })
    .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

    tracing::info!(path = %path.display(), "Watching configuration for changes");
    Ok(watcher)
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration error type
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading/writing file
    IoError(std::io::Error),
    /// JSON parsing error
    ParseError(serde_json::Error),
    /// Validation error
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "I/O error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Parse error: {}", e),
            ConfigError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::ParseError(e) => Some(e),
            ConfigError::ValidationError(_) => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

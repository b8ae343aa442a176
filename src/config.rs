//! Cache preferences and config file locations.
//!
//! Settings are plain JSON. The player re-applies them through
//! `FrameCache::apply_settings` whenever the preferences change.

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::budget::{gb_to_bytes, system_memory_limit};
use crate::core::workers::default_thread_count;
use crate::core::Direction;

/// Settings file name inside the config directory.
pub const SETTINGS_FILE: &str = "reelcache.json";

/// Log file name used by `--log` without a path.
pub const LOG_FILE: &str = "reelcache.log";

/// Environment override for the config directory.
pub const CONFIG_DIR_ENV: &str = "REELCACHE_CONFIG_DIR";

/// Cache & memory preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub cache_memory_gb: f64,       // 0 = auto (percent of available RAM)
    pub cache_memory_percent: f32,  // auto mode: 25-95% of available (default 75%)
    pub reserve_system_gb: f64,     // auto mode: left for the system (default 2 GB)
    pub max_threads: usize,         // 0 = auto (75% of cores)
    pub tick_interval_ms: u64,      // playback tick (default 25ms)
    pub back_buffer_min: i32,       // frames kept behind the playhead (default 3)
    pub back_buffer_ratio: f64,     // ... or this fraction of the media length if larger
    pub default_direction: Direction,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cache_memory_gb: 0.0,
            cache_memory_percent: 75.0,
            reserve_system_gb: 2.0,
            max_threads: 0,
            tick_interval_ms: 25,
            back_buffer_min: 3,
            back_buffer_ratio: 0.02,
            default_direction: Direction::Forward,
        }
    }
}

impl CacheSettings {
    /// Memory budget in bytes, resolving auto mode against available system memory.
    pub fn memory_bytes(&self) -> usize {
        if self.cache_memory_gb > 0.0 {
            gb_to_bytes(self.cache_memory_gb)
        } else {
            let fraction = (self.cache_memory_percent.clamp(25.0, 95.0) / 100.0) as f64;
            system_memory_limit(fraction, self.reserve_system_gb)
        }
    }

    /// Worker count, resolving auto mode.
    pub fn thread_count(&self) -> usize {
        if self.max_threads > 0 {
            self.max_threads
        } else {
            default_thread_count()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Missing file means defaults; a broken file is reported and replaced by defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("{:#}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }
        let text = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }
}

/// Where settings and the log file live.
///
/// One directory holds both, resolved in this order:
/// 1. `--config-dir` from the command line
/// 2. `REELCACHE_CONFIG_DIR`
/// 3. The working directory, if it already holds a settings file
/// 4. `<platform config dir>/reelcache`
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }

    pub fn dir(&self) -> PathBuf {
        if let Some(dir) = &self.config_dir {
            return dir.clone();
        }
        let local = std::env::current_dir()
            .ok()
            .filter(|cwd| cwd.join(SETTINGS_FILE).is_file());
        local
            .or_else(|| dirs_next::config_dir().map(|dir| dir.join("reelcache")))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn settings_file(&self) -> PathBuf {
        self.dir().join(SETTINGS_FILE)
    }

    /// Default target of `--log` without a path.
    pub fn log_file(&self) -> PathBuf {
        self.dir().join(LOG_FILE)
    }

    /// Create the directory if missing and return it.
    pub fn ensure_dir(&self) -> Result<PathBuf> {
        let dir = self.dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_dir_holds_settings_and_log() {
        let config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };
        assert_eq!(config.settings_file(), PathBuf::from("/custom/reelcache.json"));
        assert_eq!(config.log_file(), PathBuf::from("/custom/reelcache.log"));
    }

    #[test]
    fn test_cli_dir_wins_over_env() {
        let config = PathConfig::from_env_and_cli(Some(PathBuf::from("/from-cli")));
        assert_eq!(config.dir(), PathBuf::from("/from-cli"));
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let root = std::env::temp_dir().join(format!("reelcache_dir_{}", uuid::Uuid::new_v4()));
        let config = PathConfig {
            config_dir: Some(root.join("a").join("b")),
        };
        let dir = config.ensure_dir().unwrap();
        assert!(dir.is_dir());
        // Second call is a no-op
        assert_eq!(config.ensure_dir().unwrap(), dir);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn test_explicit_values_resolve_directly() {
        let settings = CacheSettings {
            cache_memory_gb: 2.0,
            max_threads: 3,
            ..Default::default()
        };
        assert_eq!(settings.memory_bytes(), 2 * 1024 * 1024 * 1024);
        assert_eq!(settings.thread_count(), 3);
        assert!(CacheSettings::default().thread_count() >= 1);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: CacheSettings = serde_json::from_str(r#"{ "max_threads": 6 }"#).unwrap();
        assert_eq!(settings.max_threads, 6);
        assert_eq!(settings.tick_interval_ms, 25);
        assert_eq!(settings.back_buffer_min, 3);
        assert_eq!(settings.default_direction, Direction::Forward);
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("reelcache_test_{}", uuid::Uuid::new_v4()));
        let path = dir.join(SETTINGS_FILE);

        let settings = CacheSettings {
            cache_memory_gb: 1.5,
            default_direction: Direction::Backward,
            ..Default::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(CacheSettings::load(&path).unwrap(), settings);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(CacheSettings::load(&path).is_err());
        assert_eq!(CacheSettings::load_or_default(&path), CacheSettings::default());

        let _ = std::fs::remove_dir_all(&dir);
    }
}

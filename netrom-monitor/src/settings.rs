//! Application settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use netrom_router::{RouterConfig, RoutingMode};
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

/// Where KISS bytes come from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceSettings {
    /// KISS over TCP (Direwolf, soundmodem, networked TNCs)
    Tcp {
        /// `host:port`
        addr: String,
    },
    /// KISS over a serial TNC
    Serial {
        /// Serial port path
        port: String,
        /// Baud rate
        #[serde(default = "default_baud")]
        baud_rate: u32,
    },
}

fn default_baud() -> u32 {
    9600
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self::Tcp {
            addr: "127.0.0.1:8001".to_string(),
        }
    }
}

impl SourceSettings {
    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            Self::Tcp { addr } => format!("tcp://{}", addr),
            Self::Serial { port, baud_rate } => format!("{} @ {} baud", port, baud_rate),
        }
    }
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Routing core configuration
    #[serde(default)]
    pub router: RouterConfig,
    /// Routing mode at startup
    #[serde(default)]
    pub mode: RoutingMode,
    /// KISS source
    #[serde(default)]
    pub source: SourceSettings,
    /// Only accept frames from this KISS port
    #[serde(default)]
    pub kiss_port: Option<u8>,
    /// Seconds between maintenance passes
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
    /// Seconds between table reports in the log
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// Snapshot file (defaults to `snapshot.json` next to the settings)
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
    /// Snapshots older than this are discarded at startup
    #[serde(default = "default_snapshot_max_age")]
    pub snapshot_max_age_secs: u64,
}

fn default_purge_interval() -> u64 {
    60
}

fn default_report_interval() -> u64 {
    300
}

fn default_snapshot_max_age() -> u64 {
    3600
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            mode: RoutingMode::default(),
            source: SourceSettings::default(),
            kiss_port: None,
            purge_interval_secs: default_purge_interval(),
            report_interval_secs: default_report_interval(),
            snapshot_path: None,
            snapshot_max_age_secs: default_snapshot_max_age(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for netrom-monitor
    /// Uses $XDG_CONFIG_HOME/netrom-monitor, falls back to ~/.config/netrom-monitor
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("netrom-monitor"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("netrom-monitor"))
    }

    /// Get the default settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from the default location
    pub fn load() -> Self {
        Self::settings_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load settings from a file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<(), MonitorError> {
        let path = Self::settings_path().ok_or(MonitorError::NoConfigDir)?;
        self.save_to(&path)
    }

    /// Save settings to a file
    pub fn save_to(&self, path: &Path) -> Result<(), MonitorError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Resolved snapshot file
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.snapshot_path
            .clone()
            .or_else(|| Self::config_dir().map(|p| p.join("snapshot.json")))
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs.max(1))
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs.max(1))
    }

    pub fn snapshot_max_age(&self) -> Duration {
        Duration::from_secs(self.snapshot_max_age_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_use_defaults() {
        let json = r#"{
            "router": {"local_callsign": "w1aw-1"},
            "mode": "Hybrid",
            "source": {"type": "serial", "port": "/dev/ttyUSB0"}
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();

        assert_eq!(settings.router.local_callsign.to_string(), "W1AW-1");
        assert_eq!(settings.router.min_route_quality, 50);
        assert_eq!(settings.mode, RoutingMode::Hybrid);
        assert_eq!(
            settings.source,
            SourceSettings::Serial {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: 9600
            }
        );
        assert_eq!(settings.purge_interval(), Duration::from_secs(60));
        assert_eq!(settings.kiss_port, None);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("netrom-monitor-test-{}", std::process::id()))
            .join("settings.json");

        let settings = Settings {
            kiss_port: Some(1),
            snapshot_path: Some(PathBuf::from("/tmp/snap.json")),
            ..Default::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), settings);

        if let Some(parent) = path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn test_missing_or_invalid_file_gives_defaults() {
        let missing = std::env::temp_dir().join("netrom-monitor-missing.json");
        assert_eq!(Settings::load_from(&missing), Settings::default());
    }

    #[test]
    fn test_describe_source() {
        assert_eq!(SourceSettings::default().describe(), "tcp://127.0.0.1:8001");
    }
}

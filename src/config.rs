//! Configuration for hidhost
//!
//! Stored as TOML. A missing file means defaults; missing fields take their
//! default values.
//!
//! ```toml
//! poll_interval_ms = 500
//!
//! [gamepad]
//! enabled = true
//!
//! [[gamepad.extra_criteria]]
//! type = "product"
//! vendor_id = 0x054C
//! product_id = 0x0CE6
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use hidhost_transport::MatchCriterion;
use serde::{Deserialize, Serialize};

use crate::gamepad::GamepadFamily;
use crate::speededitor::SpeedEditorFamily;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// How often the hotplug thread rescans the HID bus
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub gamepad: FamilyConfig,
    #[serde(default)]
    pub speed_editor: FamilyConfig,
}

/// Per-family switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Matched in addition to the built-in criteria
    #[serde(default)]
    pub extra_criteria: Vec<MatchCriterion>,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

impl Default for FamilyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            extra_criteria: Vec::new(),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            gamepad: FamilyConfig::default(),
            speed_editor: FamilyConfig::default(),
        }
    }
}

impl HostConfig {
    /// Default config file path (~/.config/hidhost/config.toml)
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hidhost")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: HostConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn gamepad_family(&self) -> GamepadFamily {
        GamepadFamily::new().with_extra_criteria(self.gamepad.extra_criteria.iter().copied())
    }

    pub fn speed_editor_family(&self) -> SpeedEditorFamily {
        SpeedEditorFamily::new().with_extra_criteria(self.speed_editor.extra_criteria.iter().copied())
    }
}

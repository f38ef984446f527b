// Daemon configuration
//
// Loaded from a TOML file (default `/etc/rgbkbd.conf`); every field has a
// default so a missing file or an empty table is a valid configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::device::{USB_DELAY_DEFAULT, USB_DELAY_MAX, USB_DELAY_MIN};

fn default_devnode_root() -> PathBuf {
    PathBuf::from("/run/rgbkbd")
}

fn default_usb_delay() -> u8 {
    USB_DELAY_DEFAULT
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Directory the per-device command/notify nodes are created under.
    #[serde(default = "default_devnode_root")]
    pub devnode_root: PathBuf,

    /// Initial USB frame spacing for new devices, in ms.
    #[serde(default = "default_usb_delay")]
    pub usb_delay: u8,

    /// Initial dither setting for new devices (0 or 1).
    #[serde(default)]
    pub dither: u8,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            devnode_root: default_devnode_root(),
            usb_delay: USB_DELAY_DEFAULT,
            dither: 0,
        }
    }
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content =
            fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        let mut config: DaemonConfig =
            toml::from_str(content).map_err(|e| format!("config parse error: {e}"))?;
        config.usb_delay = config.usb_delay.clamp(USB_DELAY_MIN, USB_DELAY_MAX);
        if config.dither > 1 {
            config.dither = 1;
        }
        Ok(config)
    }
}

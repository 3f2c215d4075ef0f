use crate::{BlkcryptError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming a config file to load.
pub const CONFIG_ENV: &str = "BLKCRYPT_CONFIG";

/// External tools invoked by the platform layer. Each entry is a bare
/// command name (looked up on `PATH`) or an absolute path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolPaths {
    pub lsblk: String,
    pub tune2fs: String,
    pub uname: String,
    pub dd: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            lsblk: "lsblk".to_string(),
            tune2fs: "tune2fs".to_string(),
            uname: "uname".to_string(),
            dd: "dd".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub tools: ToolPaths,
    /// Root under which device nodes, `disk/by-*` and `mapper/` live.
    pub dev_root: PathBuf,
    /// Last-mounted-on value that marks the boot device.
    pub boot_mountpoint: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tools: ToolPaths::default(),
            dev_root: PathBuf::from("/dev"),
            boot_mountpoint: "/boot".to_string(),
        }
    }
}

impl Config {
    /// Parse a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| {
            BlkcryptError::Configuration(format!("{}: {}", path.display(), e))
        })
    }

    /// Load from `explicit`, then `$BLKCRYPT_CONFIG`, then the user config
    /// directory, falling back to defaults when none of them is present.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("blkcrypt").join("config.json"))
    }

    /// Full path of a tool, searching `PATH` for bare names.
    pub fn resolve_tool(name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }

    /// Configured tools that cannot be found.
    pub fn missing_tools(&self) -> Vec<String> {
        [
            &self.tools.lsblk,
            &self.tools.tune2fs,
            &self.tools.uname,
            &self.tools.dd,
        ]
        .into_iter()
        .filter(|tool| Self::resolve_tool(tool).is_none())
        .cloned()
        .collect()
    }
}

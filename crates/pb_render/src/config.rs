//! Atlas configuration, loadable from JSON.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_ATLAS_SIZE: u32 = 512;
pub const DEFAULT_BORDER: u32 = 1;
pub const DEFAULT_MAX_SIZE: u32 = 4096;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    pub width: u32,
    pub height: u32,
    /// Extruded padding in pixels around every region.
    pub border: u32,
    /// Grow (by doubling) instead of failing when a texture does not fit.
    pub auto_resize: bool,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_ATLAS_SIZE,
            height: DEFAULT_ATLAS_SIZE,
            border: DEFAULT_BORDER,
            auto_resize: true,
            max_width: DEFAULT_MAX_SIZE,
            max_height: DEFAULT_MAX_SIZE,
        }
    }
}

impl AtlasConfig {
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn fixed(width: u32, height: u32) -> Self {
        Self {
            auto_resize: false,
            ..Self::with_size(width, height)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(
                "atlas width/height must be > 0".to_string(),
            ));
        }
        if self.max_width < self.width || self.max_height < self.height {
            return Err(ConfigError::Invalid(format!(
                "atlas max size {}x{} is smaller than initial size {}x{}",
                self.max_width, self.max_height, self.width, self.height
            )));
        }
        if self.border.checked_mul(2).map_or(true, |b| b >= self.width.min(self.height)) {
            return Err(ConfigError::Invalid(format!(
                "atlas border {} leaves no room inside {}x{}",
                self.border, self.width, self.height
            )));
        }
        Ok(())
    }
}

pub fn load_atlas_config_from_path(path: &Path) -> Result<AtlasConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: AtlasConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

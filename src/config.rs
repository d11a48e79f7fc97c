//! Run configuration, read from a TOML file
//!
//! ```toml
//! max_instructions = 5000000
//! random_seed = 42
//! display = "headless"
//! screen_width = 80
//! screen_height = 25
//! ```
//!
//! Every field is optional; anything left out keeps its default.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, VmError};

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Terminal,
    Headless,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Stop after this many instructions; `None` runs until quit
    pub max_instructions: Option<u64>,
    /// Seed for a predictable random number generator
    pub random_seed: Option<u64>,
    pub display: DisplayMode,
    /// Screen metrics used when no terminal size is available
    pub screen_width: u16,
    pub screen_height: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_instructions: None,
            random_seed: None,
            display: DisplayMode::Terminal,
            screen_width: 80,
            screen_height: 25,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VmError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| VmError::Config(format!("Invalid config: {}", e)))
    }
}

use std::fs::read_to_string;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use samwig_core::errors::{Result, SamWigError};
use samwig_core::sam::MAX_POSITION;

use crate::wig::{FixedValue, TrackFormat};

pub const DEFAULT_TRACK_NAME: &str = "Coverage";

/// What to do with a line that cannot be parsed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseErrorPolicy {
    #[default]
    Abort,
    Skip,
}

///
/// Settings for a coverage run. Every field has a default, so a TOML file
/// only needs to name what it changes:
///
/// ```toml
/// name = "H3K27ac"
/// format = "fixed"
/// window = 50
/// fixed_value = "reads"
/// on_parse_error = "skip"
/// ```
///
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CoverageConfig {
    pub name: String,
    pub description: Option<String>,
    pub min_depth: u32,
    pub format: TrackFormat,
    pub window: u64, // fixedStep step and span
    pub fixed_value: FixedValue,
    pub on_parse_error: ParseErrorPolicy,
    pub output: Option<PathBuf>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_TRACK_NAME.to_string(),
            description: None,
            min_depth: 1,
            format: TrackFormat::default(),
            window: 1,
            fixed_value: FixedValue::default(),
            on_parse_error: ParseErrorPolicy::default(),
            output: None,
        }
    }
}

impl CoverageConfig {
    ///
    /// Check values that serde cannot reject on its own.
    ///
    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(SamWigError::Config(
                "window must be at least 1".to_string(),
            ));
        }
        if self.window > MAX_POSITION {
            return Err(SamWigError::Config(format!(
                "window must be at most {}",
                MAX_POSITION
            )));
        }
        if self.min_depth == 0 {
            return Err(SamWigError::Config(
                "min_depth must be at least 1".to_string(),
            ));
        }
        if self.name.contains('"') {
            return Err(SamWigError::Config(format!(
                "track name may not contain double quotes: {}",
                self.name
            )));
        }
        if let Some(description) = &self.description {
            if description.contains('"') {
                return Err(SamWigError::Config(format!(
                    "track description may not contain double quotes: {}",
                    description
                )));
            }
        }
        Ok(())
    }
}

impl TryFrom<&Path> for CoverageConfig {
    type Error = SamWigError;

    fn try_from(path: &Path) -> Result<Self> {
        let toml_str = read_to_string(path)?;
        let config: CoverageConfig = toml::from_str(&toml_str)?;
        config.validate()?;
        Ok(config)
    }
}

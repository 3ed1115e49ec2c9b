//! Store configuration via `freezer.toml`
//!
//! On first open, a default `freezer.toml` is created in the data directory.
//! To change settings, edit the file and reopen the store.

use serde::{Deserialize, Serialize};
use std::path::Path;

use freezer_concurrency::RetractMode;
use freezer_core::{FreezerError, FreezerResult};
use freezer_durability::DurabilityMode;

/// Config file name placed in the store's data directory.
pub const CONFIG_FILE_NAME: &str = "freezer.toml";

/// Store configuration loaded from `freezer.toml`.
///
/// # Example
///
/// ```toml
/// # "standard" = batched fsync (~100ms), may lose the last interval on a machine crash
/// # "always"   = fsync every commit
/// durability = "standard"
///
/// # "one" = remove one matching instance, "all" = remove every matching instance
/// collection_retract = "one"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezerConfig {
    /// Durability mode: `"standard"` or `"always"`.
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// Collection retract behavior with duplicate values: `"one"` or `"all"`.
    #[serde(default = "default_collection_retract_str")]
    pub collection_retract: String,
}

fn default_durability_str() -> String {
    "standard".to_string()
}

fn default_collection_retract_str() -> String {
    "one".to_string()
}

impl Default for FreezerConfig {
    fn default() -> Self {
        Self {
            durability: default_durability_str(),
            collection_retract: default_collection_retract_str(),
        }
    }
}

impl FreezerConfig {
    /// Parse the durability string into a `DurabilityMode`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the string is not `"standard"` or `"always"`.
    pub fn durability_mode(&self) -> FreezerResult<DurabilityMode> {
        match self.durability.as_str() {
            "standard" => Ok(DurabilityMode::default()),
            "always" => Ok(DurabilityMode::Strict),
            other => Err(FreezerError::invalid_argument(format!(
                "Invalid durability mode '{}' in freezer.toml. Expected \"standard\" or \"always\".",
                other
            ))),
        }
    }

    /// Parse the collection retract string into a `RetractMode`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the string is not `"one"` or `"all"`.
    pub fn retract_mode(&self) -> FreezerResult<RetractMode> {
        match self.collection_retract.as_str() {
            "one" => Ok(RetractMode::One),
            "all" => Ok(RetractMode::All),
            other => Err(FreezerError::invalid_argument(format!(
                "Invalid collection_retract '{}' in freezer.toml. Expected \"one\" or \"all\".",
                other
            ))),
        }
    }

    /// Check every field
    pub fn validate(&self) -> FreezerResult<()> {
        self.durability_mode()?;
        self.retract_mode()?;
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Freezer store configuration
#
# Durability mode: "standard" (default) or "always"
#   "standard" = batched fsync (~100ms or 1000 commits), may lose the last
#                interval on a machine crash
#   "always"   = fsync every commit
durability = "standard"

# Retracting a collection value that is asserted more than once:
#   "one" = remove one matching instance (default)
#   "all" = remove every matching instance
collection_retract = "one"
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read and `InvalidArgument` if it
    /// cannot be parsed or holds an unknown setting.
    pub fn from_file(path: &Path) -> FreezerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FreezerConfig = toml::from_str(&content).map_err(|e| {
            FreezerError::invalid_argument(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> FreezerResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> FreezerResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            FreezerError::Serialization(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

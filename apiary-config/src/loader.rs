//! Loading and saving hive configuration files

use crate::{ConfigError, HiveConfig, Result};
use std::path::Path;
use tracing::{debug, info};

/// Configuration file format, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Detect the format from a path's extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "json" | "conf" => Ok(ConfigFormat::Json),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Parse configuration text
    pub fn parse(&self, source: &str, origin: &str) -> Result<HiveConfig> {
        let parsed = match self {
            ConfigFormat::Json => serde_json::from_str(source).map_err(|e| e.to_string()),
            ConfigFormat::Yaml => serde_yaml::from_str(source).map_err(|e| e.to_string()),
        };
        parsed.map_err(|message| ConfigError::Parse {
            path: origin.to_string(),
            message,
        })
    }

    /// Serialize configuration text
    pub fn render(&self, config: &HiveConfig) -> Result<String> {
        match self {
            ConfigFormat::Json => serde_json::to_string_pretty(config)
                .map_err(|e| ConfigError::Serialize(e.to_string())),
            ConfigFormat::Yaml => {
                serde_yaml::to_string(config).map_err(|e| ConfigError::Serialize(e.to_string()))
            }
        }
    }
}

/// Load a hive configuration from a JSON or YAML file
pub fn load_file(path: impl AsRef<Path>) -> Result<HiveConfig> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let source = std::fs::read_to_string(path)?;
    let config = format.parse(&source, &path.display().to_string())?;

    info!(
        path = %path.display(),
        bees = config.bees.len(),
        actions = config.actions.len(),
        chains = config.chains.len(),
        "Loaded configuration"
    );
    Ok(config)
}

/// Save a hive configuration in the format given by the file's extension
///
/// The file is written to a sibling temporary path first and renamed into place.
pub fn save_file(path: impl AsRef<Path>, config: &HiveConfig) -> Result<()> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let rendered = format.render(config)?;

    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    std::fs::write(&staging, rendered)?;
    std::fs::rename(&staging, path)?;

    debug!(path = %path.display(), "Saved configuration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("hive.json")).unwrap(),
            ConfigFormat::Json
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("hive.YML")).unwrap(),
            ConfigFormat::Yaml
        );
        assert!(matches!(
            ConfigFormat::from_path(Path::new("hive.toml")),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_parse_error_names_origin() {
        let err = ConfigFormat::Json.parse("{ not json", "inline").unwrap_err();
        match err {
            ConfigError::Parse { path, .. } => assert_eq!(path, "inline"),
            other => panic!("unexpected error {:?}", other),
        }
    }
}

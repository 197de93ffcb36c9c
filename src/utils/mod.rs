//! Utility functions and helpers

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use crate::errors::{AlbError, Result};

/// Generate a short random identifier suitable for embedding in resource ids
pub fn generate_short_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

/// Serialization format of a state or desired-state document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
    Toml,
}

impl DocumentFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match extension.as_str() {
            "yml" | "yaml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            "toml" => Ok(Self::Toml),
            other => Err(AlbError::validation_field(
                format!(
                    "Unsupported document extension '{}' for {}; use .yaml, .yml, .json or .toml",
                    other,
                    path.display()
                ),
                "path",
            )),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Toml => "toml",
        }
    }

    /// Parse a document from text
    pub fn parse<T: DeserializeOwned>(&self, text: &str) -> Result<T> {
        match self {
            Self::Yaml => serde_yaml::from_str(text)
                .map_err(|e| AlbError::serialization(format!("Invalid YAML: {}", e))),
            Self::Json => Ok(serde_json::from_str(text)?),
            Self::Toml => toml::from_str(text)
                .map_err(|e| AlbError::serialization(format!("Invalid TOML: {}", e))),
        }
    }

    /// Render a value as a document
    pub fn render<T: Serialize>(&self, value: &T) -> Result<String> {
        match self {
            Self::Yaml => serde_yaml::to_string(value)
                .map_err(|e| AlbError::serialization(format!("Failed to render YAML: {}", e))),
            Self::Json => Ok(serde_json::to_string_pretty(value)?),
            Self::Toml => toml::to_string_pretty(value)
                .map_err(|e| AlbError::serialization(format!("Failed to render TOML: {}", e))),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Read and parse a document, picking the format from the extension
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let format = DocumentFormat::from_path(path)?;
    let text = std::fs::read_to_string(path)
        .map_err(|e| AlbError::io(e, format!("Failed to read {}", path.display())))?;
    format.parse(&text)
}

/// Render and write a document, creating parent directories as needed
pub fn write_document<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let format = DocumentFormat::from_path(path)?;
    let text = format.render(value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| AlbError::io(e, format!("Failed to create {}", parent.display())))?;
    }
    std::fs::write(path, text)
        .map_err(|e| AlbError::io(e, format!("Failed to write {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DocumentFormat::from_path(Path::new("a.YML")).unwrap(), DocumentFormat::Yaml);
        assert_eq!(DocumentFormat::from_path(Path::new("a.json")).unwrap(), DocumentFormat::Json);
        assert_eq!(DocumentFormat::from_path(Path::new("a.toml")).unwrap(), DocumentFormat::Toml);
        assert!(DocumentFormat::from_path(Path::new("a.alb")).is_err());
    }

    #[test]
    fn test_write_then_read_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let mut value = BTreeMap::new();
        value.insert("name".to_string(), "web".to_string());

        write_document(&path, &value).unwrap();
        let read: BTreeMap<String, String> = read_document(&path).unwrap();
        assert_eq!(read, value);
    }

    #[test]
    fn test_short_id_length() {
        assert_eq!(generate_short_id().len(), 16);
    }
}

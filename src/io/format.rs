//! Checkpoint file formats

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported checkpoint serialization formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointFormat {
    /// JSON (human-readable)
    Json,

    /// YAML (human-readable)
    Yaml,

    /// SafeTensors; non-weight fields travel in the header metadata
    SafeTensors,
}

impl CheckpointFormat {
    pub fn extension(&self) -> &str {
        match self {
            CheckpointFormat::Json => "json",
            CheckpointFormat::Yaml => "yaml",
            CheckpointFormat::SafeTensors => "safetensors",
        }
    }

    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(CheckpointFormat::Json),
            "yaml" | "yml" => Some(CheckpointFormat::Yaml),
            "safetensors" => Some(CheckpointFormat::SafeTensors),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::Serialization(format!("{} has no extension", path.display())))?;
        Self::from_extension(ext)
            .ok_or_else(|| Error::Serialization(format!("Unsupported file extension: {ext}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(CheckpointFormat::from_extension("json"), Some(CheckpointFormat::Json));
        assert_eq!(CheckpointFormat::from_extension("YML"), Some(CheckpointFormat::Yaml));
        assert_eq!(
            CheckpointFormat::from_extension("SafeTensors"),
            Some(CheckpointFormat::SafeTensors)
        );
        assert_eq!(CheckpointFormat::from_extension("bin"), None);
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            CheckpointFormat::from_path(Path::new("runs/model.yaml")).unwrap(),
            CheckpointFormat::Yaml
        );
        assert!(CheckpointFormat::from_path(Path::new("model")).is_err());
        assert!(CheckpointFormat::from_path(Path::new("model.pt")).is_err());
    }

    #[test]
    fn test_extension_round_trips() {
        for format in [
            CheckpointFormat::Json,
            CheckpointFormat::Yaml,
            CheckpointFormat::SafeTensors,
        ] {
            assert_eq!(CheckpointFormat::from_extension(format.extension()), Some(format));
        }
    }
}

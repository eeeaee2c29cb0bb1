//! Export formats and the exported document shape

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::point::Point;

/// Serialization format for series exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Pretty-printed JSON
    Json,
    /// Block-style YAML
    Yaml,
}

impl ExportFormat {
    /// File extension used for default export paths
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "yaml" | "yml" => Ok(ExportFormat::Yaml),
            other => Err(Error::ConfigurationError(format!("Unknown export format: {}", other))),
        }
    }
}

/// Exported series: `{"regions": [{"x": .., "y": ..}, ...]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    /// Points in arrival order
    pub regions: Vec<Point>,
}

impl From<Vec<Point>> for ExportDocument {
    fn from(regions: Vec<Point>) -> Self {
        Self { regions }
    }
}

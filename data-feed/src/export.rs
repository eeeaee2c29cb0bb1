//! Series export encoding and file output

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use common::{Error, ExportDocument, ExportFormat, Result};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use tracing::info;

/// Encode a document; JSON uses 4-space indentation, YAML block style
pub fn encode(document: &ExportDocument, format: ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Json => {
            let mut out = Vec::new();
            let mut serializer = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
            document
                .serialize(&mut serializer)
                .map_err(|e| Error::Export(format!("JSON encoding failed: {}", e)))?;
            out.push(b'\n');
            Ok(out)
        }
        ExportFormat::Yaml => serde_yaml::to_string(document)
            .map(String::into_bytes)
            .map_err(|e| Error::Export(format!("YAML encoding failed: {}", e))),
    }
}

/// Decode a previously exported document
pub fn decode(bytes: &[u8], format: ExportFormat) -> Result<ExportDocument> {
    match format {
        ExportFormat::Json => Ok(serde_json::from_slice(bytes)?),
        ExportFormat::Yaml => Ok(serde_yaml::from_slice(bytes)?),
    }
}

/// `<dir>/<prefix>_<YYYYMMDD_HHMMSS>.<ext>`
pub fn default_export_path<Tz>(dir: &Path, prefix: &str, format: ExportFormat, now: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    dir.join(format!("{}_{}.{}", prefix, now.format("%Y%m%d_%H%M%S"), format.extension()))
}

/// Write `bytes` to `path` atomically
///
/// Data goes to a temporary file in the destination directory which is then
/// renamed over `path`, so a failed write never leaves a partial file.
pub fn write_export(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .map_err(|e| Error::Export(format!("cannot create {}: {}", parent.display(), e)))?;

    let mut file = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| Error::Export(format!("cannot create temporary file in {}: {}", parent.display(), e)))?;
    file.write_all(bytes)
        .and_then(|_| file.as_file().sync_all())
        .map_err(|e| Error::Export(format!("writing {} failed: {}", path.display(), e)))?;
    file.persist(path)
        .map_err(|e| Error::Export(format!("moving export into {} failed: {}", path.display(), e.error)))?;

    info!(path = %path.display(), bytes = bytes.len(), "Export written");
    Ok(())
}

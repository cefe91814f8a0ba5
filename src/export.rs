//! Writing collected records to CSV or JSON files.

use crate::error::{Error, Result};
use crate::types::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

/// UTF-8 byte order mark, so spreadsheet tools pick the right encoding
const UTF8_BOM: &[u8] = "\u{feff}".as_bytes();

/// Output file format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma-separated values with a header row
    Csv,
    /// Pretty-printed JSON array
    Json,
}

impl ExportFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    /// Guess the format from a path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Suggested file name for an export: `transactions_{subject}_{YYYYmmdd_HHMMSS}.{ext}`
pub fn default_file_name<Tz>(
    subject: &str,
    format: ExportFormat,
    timestamp: chrono::DateTime<Tz>,
) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "transactions_{}_{}.{}",
        subject,
        timestamp.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

/// Write `records` to `path` in the given format
///
/// Returns the number of records written. An empty list is refused with
/// [`Error::NothingToExport`] and no file is created.
///
/// The records go to a `.{name}.partial` file next to `path`, which is
/// renamed over `path` once complete. On failure the partial file is removed
/// and an existing file at `path` is left untouched.
pub fn export_records(records: &[Record], path: impl AsRef<Path>, format: ExportFormat) -> Result<usize> {
    if records.is_empty() {
        return Err(Error::NothingToExport);
    }
    let path = path.as_ref();
    let partial = partial_path(path)?;

    let written = write_file(records, &partial, format).and_then(|()| {
        std::fs::rename(&partial, path)?;
        Ok(())
    });
    if let Err(e) = written {
        tracing::warn!(path = %path.display(), error = %e, "export failed");
        std::fs::remove_file(&partial).ok();
        return Err(e);
    }

    tracing::info!(
        path = %path.display(),
        format = %format,
        records = records.len(),
        "records exported"
    );
    Ok(records.len())
}

fn partial_path(path: &Path) -> Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("export path {} has no file name", path.display()),
        )
    })?;
    let mut partial = OsString::from(".");
    partial.push(name);
    partial.push(".partial");
    Ok(path.with_file_name(partial))
}

fn write_file(records: &[Record], path: &Path, format: ExportFormat) -> Result<()> {
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    match format {
        ExportFormat::Csv => write_csv(records, file),
        ExportFormat::Json => write_json(records, file),
    }
}

/// Write records as CSV (BOM, sorted header union, one row per record)
pub fn write_csv<W: Write>(records: &[Record], mut writer: W) -> Result<()> {
    writer.write_all(UTF8_BOM)?;

    let headers: BTreeSet<&str> = records
        .iter()
        .flat_map(|record| record.keys().map(String::as_str))
        .collect();

    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);
    csv_writer.write_record(&headers)?;
    for record in records {
        csv_writer.write_record(headers.iter().map(|key| cell(record.get(*key))))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Write records as a pretty-printed JSON array
pub fn write_json<W: Write>(records: &[Record], mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

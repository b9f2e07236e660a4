//! Inventory export for external tools.

use std::io::Write;
use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use clap::ValueEnum;
use color_eyre::eyre::{Context, Result};
use serde::Serialize;

use lumidisk_core::{FileEntry, Inventory};

/// Export file format.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

const CSV_HEADER: [&str; 6] = ["path", "type", "size_bytes", "modified_iso", "ext", "is_hidden"];

#[derive(Serialize)]
struct CsvRow<'a> {
    path: String,
    kind: &'static str,
    size_bytes: u64,
    modified_iso: String,
    ext: &'a str,
    is_hidden: bool,
}

impl<'a> From<&'a FileEntry> for CsvRow<'a> {
    fn from(entry: &'a FileEntry) -> Self {
        Self {
            path: entry.path.to_string_lossy().into_owned(),
            kind: if entry.is_dir { "dir" } else { "file" },
            size_bytes: entry.size,
            modified_iso: format_time(entry.modified),
            ext: entry.extension(),
            is_hidden: entry.is_hidden,
        }
    }
}

/// Write `inventory` to `out` in the requested format.
pub fn export<W: Write>(inventory: &Inventory, format: ExportFormat, mut out: W) -> Result<()> {
    match format {
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut out, inventory).context("Failed to write JSON")?;
            out.flush()?;
            Ok(())
        }
        ExportFormat::Csv => write_csv(inventory, out),
    }
}

/// One row per entry, in inventory order.
fn write_csv<W: Write>(inventory: &Inventory, out: W) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    writer.write_record(CSV_HEADER)?;
    for entry in &inventory.entries {
        writer
            .serialize(CsvRow::from(entry))
            .with_context(|| format!("Failed to write row for {}", entry.path.display()))?;
    }
    writer.flush()?;
    Ok(())
}

/// RFC 3339 UTC timestamp with second precision.
pub fn format_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn sample() -> Inventory {
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        Inventory::from_entries(
            vec![
                FileEntry::directory("/data", t, false),
                FileEntry::file("/data/Report, final.PDF", 2048, t, false),
                FileEntry::file("/data/.env", 12, t, true),
            ],
            Duration::from_millis(5),
        )
    }

    #[test]
    fn test_csv_export() {
        let mut out = Vec::new();
        export(&sample(), ExportFormat::Csv, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "path,type,size_bytes,modified_iso,ext,is_hidden");
        assert_eq!(lines[1], "/data,dir,0,2023-11-14T22:13:20Z,,false");
        assert_eq!(
            lines[2],
            "\"/data/Report, final.PDF\",file,2048,2023-11-14T22:13:20Z,pdf,false"
        );
        assert_eq!(lines[3], "/data/.env,file,12,2023-11-14T22:13:20Z,,true");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_json_export() {
        let mut out = Vec::new();
        export(&sample(), ExportFormat::Json, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(value["stats"]["total_size"], 2060);
        assert_eq!(value["stats"]["total_files"], 2);
        assert_eq!(value["entries"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_export_pre_epoch_times() {
        let old = UNIX_EPOCH - Duration::from_secs(86_400);
        let inventory = Inventory::from_entries(
            vec![FileEntry::file("/vintage/tape.img", 7, old, false)],
            Duration::ZERO,
        );

        let mut out = Vec::new();
        export(&inventory, ExportFormat::Json, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["entries"][0]["modified"]["secs"], -86_400);

        let mut out = Vec::new();
        export(&inventory, ExportFormat::Csv, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("1969-12-31T00:00:00Z"));
    }
}

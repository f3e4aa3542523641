//! Output formatting for canvas-sync CLI
//!
//! Human-readable and JSON rendering shared by all commands.

use std::error::Error as _;

use anyhow::Result;
use canvas_types::FileRecord;
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Byte count with a binary unit suffix.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// One file record. `now_ms` is used to show the record's age.
pub fn format_record(record: &FileRecord, now_ms: i64, verbose: bool) -> String {
    let meta = &record.metadata;
    let mut out = format!(
        "\x1b[36m{}\x1b[0m  {}",
        record.id,
        meta.name.as_deref().unwrap_or("<unnamed>")
    );
    if meta.trashed {
        out.push_str("  \x1b[31m(trashed)\x1b[0m");
    }
    out.push('\n');

    if let Some(mime) = &meta.mime_type {
        out.push_str(&format!("  type:     {}\n", mime));
    }
    if let Some(size) = meta.size {
        out.push_str(&format!("  size:     {}\n", format_size(size)));
    }
    if let Some(checksum) = &meta.checksum {
        out.push_str(&format!("  checksum: {}\n", checksum));
    }
    out.push_str(&format!(
        "  loaded:   {:.1}s ago\n",
        record.age_ms(now_ms) as f64 / 1000.0
    ));

    if verbose {
        if !meta.parents.is_empty() {
            out.push_str(&format!("  parents:  {}\n", meta.parents.join(", ")));
        }
        let caps = &meta.capabilities;
        out.push_str(&format!(
            "  can:      download={} edit={} trash={}\n",
            caps.can_download, caps.can_edit, caps.can_trash
        ));
        for (key, value) in &meta.properties {
            out.push_str(&format!("  prop:     {} = {}\n", key, value));
        }
    }
    out
}

/// Format an error for display
pub fn format_error(error: &anyhow::Error, json_output: bool) -> String {
    if json_output {
        #[derive(Serialize)]
        struct ErrorJson {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            cause: Option<String>,
        }

        let err = ErrorJson {
            error: error.to_string(),
            cause: error.source().map(|e| e.to_string()),
        };
        serde_json::to_string_pretty(&err).unwrap_or_else(|_| "{}".to_string())
    } else {
        let mut out = format!("\x1b[31mError:\x1b[0m {}\n", error);
        let mut causes = error.chain().skip(1).peekable();
        if causes.peek().is_some() {
            out.push_str("Caused by:\n");
            for (idx, cause) in causes.enumerate() {
                out.push_str(&format!("  {}: {}\n", idx + 1, cause));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvas_types::FileMetadata;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KiB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MiB");
    }

    #[test]
    fn test_format_record_shows_age_and_trash() {
        let record = FileRecord::new(
            "f1",
            FileMetadata {
                name: Some("sketch.png".to_string()),
                trashed: true,
                ..FileMetadata::default()
            },
            1_000,
        );
        let out = format_record(&record, 3_500, false);
        assert!(out.contains("sketch.png"));
        assert!(out.contains("(trashed)"));
        assert!(out.contains("2.5s ago"));
    }
}

//! Download command - resolve file content through the cache

use std::path::PathBuf;

use anyhow::{Context, Result};
use canvas_sync::{RetrievalStrategy, SyncSession};
use clap::Parser;
use serde::Serialize;

use super::output::{format_error, format_size, print_json};

#[derive(Parser, Debug)]
pub struct DownloadCmd {
    /// File id
    #[arg(value_name = "ID")]
    pub id: String,

    /// Strategy for the content lookup
    #[arg(long, default_value = "lazy")]
    pub media_strategy: RetrievalStrategy,

    /// Strategy for the metadata lookup
    #[arg(long, default_value = "recent")]
    pub file_strategy: RetrievalStrategy,

    /// Write the content to this path
    #[arg(long, short)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct DownloadResult {
    pub id: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub written_to: Option<PathBuf>,
}

impl DownloadCmd {
    pub async fn execute(&self, session: &SyncSession, json_output: bool) -> Result<()> {
        match self.execute_inner(session).await {
            Ok(output) => {
                if json_output {
                    print_json(&output)?;
                } else {
                    print_download_result(&output);
                }
                Ok(())
            }
            Err(e) => {
                eprintln!("{}", format_error(&e, json_output));
                Err(e)
            }
        }
    }

    async fn execute_inner(&self, session: &SyncSession) -> Result<DownloadResult> {
        let media = session
            .download_media(&self.id, self.media_strategy, self.file_strategy)
            .await?;
        let Some(media) = media else {
            return Ok(DownloadResult {
                id: self.id.clone(),
                available: false,
                checksum: None,
                bytes: 0,
                written_to: None,
            });
        };

        if let Some(path) = &self.out {
            std::fs::write(path, &media.payload)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        Ok(DownloadResult {
            id: media.id.clone(),
            available: true,
            checksum: Some(media.checksum.clone()),
            bytes: media.len() as u64,
            written_to: self.out.clone(),
        })
    }
}

fn print_download_result(result: &DownloadResult) {
    if !result.available {
        println!("\x1b[33m{}: content not cached\x1b[0m", result.id);
        return;
    }
    println!(
        "\x1b[32m✓\x1b[0m {} ({}, checksum {})",
        result.id,
        format_size(result.bytes),
        result.checksum.as_deref().unwrap_or("-")
    );
    if let Some(path) = &result.written_to {
        println!("  written to {}", path.display());
    }
}

//! Cache-info command - durable cache usage and session counters

use anyhow::Result;
use canvas_sync::{CacheInfo, SyncSession};
use clap::Parser;

use super::output::{format_error, format_size, print_json};

#[derive(Parser, Debug)]
pub struct CacheInfoCmd {}

impl CacheInfoCmd {
    pub async fn execute(&self, session: &SyncSession, json_output: bool) -> Result<()> {
        match session.cache_info().await {
            Ok(info) => {
                if json_output {
                    print_json(&info)?;
                } else {
                    print_cache_info(&info);
                }
                Ok(())
            }
            Err(e) => {
                eprintln!("{}", format_error(&e, json_output));
                Err(e)
            }
        }
    }
}

fn print_cache_info(info: &CacheInfo) {
    let durable = &info.durable;
    println!("\x1b[1mDurable cache\x1b[0m");
    if durable.available {
        if let Some(root) = &durable.root {
            println!("  root:    {}", root.display());
        }
        if let Some(version) = durable.schema_version {
            println!("  schema:  v{}", version);
        }
        for (name, stats) in &durable.collections {
            println!(
                "  {:<8} {} record(s), {}",
                format!("{}:", name),
                stats.records,
                format_size(stats.bytes)
            );
        }
    } else {
        println!(
            "  unavailable: {}",
            durable.unavailable_reason.as_deref().unwrap_or("unknown")
        );
    }

    println!("\x1b[1mMemory\x1b[0m");
    println!("  files:   {}", info.memory_files);
    println!(
        "  media:   {} ({})",
        info.memory_media,
        format_size(info.memory_media_bytes as u64)
    );
    println!();
    print!("{}", info.metrics.format_report());
}

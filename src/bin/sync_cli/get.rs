//! Get command - resolve file metadata through the cache

use anyhow::Result;
use canvas_sync::{FileRecord, RetrievalStrategy, SyncSession};
use canvas_types::now_ms;
use clap::Parser;
use serde::Serialize;

use super::output::{format_error, format_record, print_json};

#[derive(Parser, Debug)]
pub struct GetCmd {
    /// File ids
    #[arg(value_name = "ID", required = true)]
    pub ids: Vec<String>,

    /// Retrieval strategy: passive, optimistic-cache, cache-only, lazy, recent, source
    #[arg(long, short, default_value = "lazy")]
    pub strategy: RetrievalStrategy,
}

#[derive(Debug, Serialize)]
pub struct GetResult {
    pub strategy: RetrievalStrategy,
    pub files: Vec<FileRecord>,
    /// Requested ids not in `files`.
    pub missing: Vec<String>,
}

impl GetCmd {
    pub async fn execute(&self, session: &SyncSession, json_output: bool, verbose: bool) -> Result<()> {
        match self.execute_inner(session).await {
            Ok(output) => {
                if json_output {
                    print_json(&output)?;
                } else {
                    print_get_result(&output, verbose);
                }
                Ok(())
            }
            Err(e) => {
                eprintln!("{}", format_error(&e, json_output));
                Err(e)
            }
        }
    }

    async fn execute_inner(&self, session: &SyncSession) -> Result<GetResult> {
        let files = session.get_files(&self.ids, self.strategy).await?;
        let missing = self
            .ids
            .iter()
            .filter(|id| !files.iter().any(|f| &f.id == *id))
            .cloned()
            .collect();
        Ok(GetResult {
            strategy: self.strategy,
            files,
            missing,
        })
    }
}

fn print_get_result(result: &GetResult, verbose: bool) {
    let now = now_ms();
    for record in &result.files {
        print!("{}", format_record(record, now, verbose));
    }
    if !result.missing.is_empty() {
        println!(
            "\x1b[33mNot available ({}):\x1b[0m {}",
            result.strategy,
            result.missing.join(", ")
        );
    }
}

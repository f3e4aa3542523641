//! List command - query the remote and cache the results

use anyhow::Result;
use canvas_sync::{FileRecord, SyncSession};
use canvas_types::now_ms;
use clap::Parser;

use super::output::{format_error, format_record, print_json};

#[derive(Parser, Debug)]
pub struct ListCmd {
    /// Remote query, e.g. "'folder-id' in parents and trashed = false"
    #[arg(long, short, default_value = "trashed = false")]
    pub query: String,

    /// Sort order understood by the remote, e.g. "name"
    #[arg(long)]
    pub order_by: Option<String>,
}

impl ListCmd {
    pub async fn execute(&self, session: &SyncSession, json_output: bool, verbose: bool) -> Result<()> {
        match self.execute_inner(session).await {
            Ok(files) => {
                if json_output {
                    print_json(&files)?;
                } else {
                    let now = now_ms();
                    for record in &files {
                        print!("{}", format_record(record, now, verbose));
                    }
                    println!("{} file(s)", files.len());
                }
                Ok(())
            }
            Err(e) => {
                eprintln!("{}", format_error(&e, json_output));
                Err(e)
            }
        }
    }

    async fn execute_inner(&self, session: &SyncSession) -> Result<Vec<FileRecord>> {
        Ok(session
            .list_files(&self.query, self.order_by.as_deref())
            .await?)
    }
}

//! CLI subcommand implementations for canvas-sync

pub mod cache_info;
pub mod download;
pub mod get;
pub mod list;
pub mod output;

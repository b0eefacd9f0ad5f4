use crate::cli::run;

pub mod cli;
mod config;
pub mod domain;
pub mod http;
pub mod ingest;
pub mod storage;
pub mod streaming;

fn main() -> anyhow::Result<()> {
    run()
}

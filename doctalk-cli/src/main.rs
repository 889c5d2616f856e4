//! `doctalk`: upload local text files and chat with them in the terminal.
//!
//! ```sh
//! doctalk notes.txt report.txt
//! DOCTALK_CHUNK_SIZE=256 doctalk --top-k 10 handbook.txt
//! RUST_LOG=doctalk_session=debug doctalk notes.txt
//! ```

mod cli;
mod repl;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Args, load_documents};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let chat = args.build_chat()?;
    let documents = load_documents(&args.files)?;

    let receipt = chat.upload(documents).await?;
    info!(session.id = %receipt.session_id, "session ready");
    println!(
        "Indexed {} file(s) into {} chunks: {}",
        receipt.processed_files.len(),
        receipt.chunk_count,
        receipt.processed_files.join(", ")
    );

    let result = repl::run(&chat, &receipt.session_id).await;
    chat.end_session(&receipt.session_id).await;
    result
}

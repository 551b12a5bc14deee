//! ferryd - receive files into a destination directory

use anyhow::{Context, Result};
use clap::Parser;
use ferry::net::server;
use ferry::protocol::DEFAULT_PORT;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Receive files from ferry senders")]
struct Args {
    /// Directory that received files are written into (created if missing)
    destination: PathBuf,

    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Listen port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if !args.destination.exists() {
        std::fs::create_dir_all(&args.destination)
            .with_context(|| format!("create {}", args.destination.display()))?;
        println!("[Server] created directory: {}", args.destination.display());
    }

    let bind = format!("{}:{}", args.bind, args.port);
    server::serve(&bind, &args.destination).await
}

//! ferry - send files or directory trees to a ferryd receiver

use anyhow::{bail, Result};
use clap::Parser;
use ferry::net::client;
use ferry::progress::TransferProgress;
use ferry::protocol::DEFAULT_PORT;
use ferry::sender::TransferControl;
use ferry::{fs_walk, sender};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Send files to a ferryd receiver")]
struct Args {
    /// File or directory to send
    source: PathBuf,

    /// Server host name or IP address
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Show a byte-level progress bar
    #[arg(long)]
    progress: bool,

    /// Seconds to wait for acknowledgements after the last file
    #[arg(long, default_value_t = 30)]
    ack_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let entries = fs_walk::enumerate_files(&args.source)?;
    if entries.is_empty() {
        println!("[Client] nothing to send under {}", args.source.display());
        return Ok(());
    }

    let mut total_bytes = 0u64;
    for entry in &entries {
        total_bytes += std::fs::metadata(&entry.local_path)?.len();
    }

    let conn = client::connect(&args.host, args.port).await?;
    let progress = args.progress.then(|| TransferProgress::new(total_bytes));

    let control = Arc::new(TransferControl::new());
    {
        let control = control.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("[Client] interrupt received, stopping transfer");
                control.request_stop();
            }
        });
    }

    let mut sent = 0u64;
    for entry in &entries {
        if control.is_stop_requested() {
            break;
        }
        println!("[Transfer] sending {}", entry.remote_name);
        sender::send_file(
            &conn.handle,
            &entry.local_path,
            &entry.remote_name,
            progress.as_ref(),
            Some(control.as_ref()),
        )
        .await?;
        sent += 1;
    }
    if let Some(progress) = &progress {
        progress.finish();
    }
    if control.is_stop_requested() {
        bail!("transfer stopped after {sent} of {} files", entries.len());
    }

    let all_acked = conn
        .wait_for_acks(sent, Duration::from_secs(args.ack_timeout))
        .await;
    let acked = conn.acked_files().min(sent);
    println!("[Client] {acked}/{sent} files acknowledged");
    conn.shutdown().await;

    if !all_acked {
        bail!("{} of {sent} files were not acknowledged", sent - acked);
    }
    Ok(())
}

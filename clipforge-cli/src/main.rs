//! Clipforge CLI - boots the download-and-convert server.

use std::path::PathBuf;

use clap::Parser;
use clipforge_core::config::ClipforgeConfig;
use clipforge_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "clipforge")]
#[command(about = "A download-and-convert media server")]
struct Cli {
    /// Port to listen on (overrides environment)
    #[arg(long)]
    port: Option<u16>,

    /// Scratch directory for ephemeral artifacts
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Console log level; the debug log file always captures everything
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    /// Directory for debug log files
    #[arg(long)]
    logs_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())
        .map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))?;

    let mut config = ClipforgeConfig::from_env();
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(dir) = cli.scratch_dir {
        config.storage.scratch_dir = dir;
    }

    clipforge_web::run_server(config)
        .await
        .map_err(|e| anyhow::anyhow!("server failed: {e}"))
}

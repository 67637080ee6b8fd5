use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use slotsync::haproxy::ConfigRenderer;
use slotsync::Supervisor;
use slotsync_core::{load_config, logging};

/// Fill HAProxy backend slots with peers discovered through DNS SRV records
#[derive(Parser, Debug)]
#[command(name = "slotsync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "SLOTSYNC_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Print the rendered HAProxy configuration and exit
    #[arg(long)]
    render_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load and validate configuration
    let config = load_config(args.config.as_deref())?;

    if args.render_config {
        print!("{}", ConfigRenderer::new()?.render(&config.haproxy)?);
        return Ok(());
    }

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("slotsync starting...");
    info!(
        method = config.discovery.method.map_or("unset", |m| m.as_str()),
        slots = config.haproxy.slots,
        conf = %config.haproxy.conf_path.display(),
        admin_socket = %config.haproxy.admin_socket.display(),
        "Configuration loaded"
    );

    // 3. Run until signalled or HAProxy exits
    Supervisor::new(Arc::new(config)).run().await?;

    info!("slotsync stopped");
    Ok(())
}

//! HAProxy child process

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use slotsync_core::Config;

use super::template::ConfigRenderer;
use crate::supervisor::ExitReason;

/// Starts the load balancer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Launcher: Send {
    /// Write the configuration and start the process
    ///
    /// Returns once the process has been spawned, not once it is ready.
    async fn launch(&mut self) -> Result<()>;
}

/// Launches HAProxy in master-worker mode with its output on ours
pub struct HaproxyLauncher {
    config: Arc<Config>,
    exit_tx: mpsc::Sender<ExitReason>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl HaproxyLauncher {
    #[must_use]
    pub const fn new(
        config: Arc<Config>,
        exit_tx: mpsc::Sender<ExitReason>,
        tracker: TaskTracker,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            exit_tx,
            tracker,
            cancel,
        }
    }

    async fn write_config(&self) -> Result<()> {
        let haproxy = &self.config.haproxy;
        let rendered = ConfigRenderer::new()?.render(haproxy)?;
        tokio::fs::write(&haproxy.conf_path, rendered)
            .await
            .with_context(|| format!("Failed to write {}", haproxy.conf_path.display()))?;
        Ok(())
    }

    fn spawn(&self) -> Result<Child> {
        let haproxy = &self.config.haproxy;
        Command::new(&haproxy.bin_path)
            .arg("-W")
            .arg("-db")
            .arg("-f")
            .arg(&haproxy.conf_path)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", haproxy.bin_path))
    }
}

#[async_trait]
impl Launcher for HaproxyLauncher {
    async fn launch(&mut self) -> Result<()> {
        self.write_config().await?;
        let mut child = self.spawn()?;
        info!(
            pid = child.id(),
            conf = %self.config.haproxy.conf_path.display(),
            "HAProxy started"
        );

        let exit_tx = self.exit_tx.clone();
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let detail = match status {
                        Ok(status) => status.to_string(),
                        Err(e) => format!("wait failed: {e}"),
                    };
                    error!("HAProxy exited: {}", detail);
                    let _ = exit_tx.send(ExitReason::BalancerExited(detail)).await;
                }
                () = cancel.cancelled() => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill HAProxy: {}", e);
                    } else {
                        info!("HAProxy stopped");
                    }
                }
            }
        });

        Ok(())
    }
}

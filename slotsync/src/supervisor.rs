//! Process lifecycle: wiring, shutdown and cleanup

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use slotsync_core::Config;
use slotsync_discovery::new_discovery;

use crate::haproxy::{HaproxyLauncher, RuntimeClient};
use crate::reconcile::Reconciler;

/// How long tasks get to stop after cancellation before they are aborted
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Why the process is shutting down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Signal(&'static str),
    BalancerExited(String),
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(name) => write!(f, "received {name}"),
            Self::BalancerExited(status) => write!(f, "HAProxy exited ({status})"),
        }
    }
}

pub struct Supervisor {
    config: Arc<Config>,
}

impl Supervisor {
    #[must_use]
    pub const fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Run until a signal, the HAProxy child exiting or a fatal error
    ///
    /// The rendered config and admin socket are removed on every exit path
    /// once discovery has been initialised.
    pub async fn run(self) -> Result<()> {
        let discovery = new_discovery(&self.config).context("Failed to initialise discovery")?;
        let signals = shutdown_signal();

        let (exit_tx, mut exit_rx) = mpsc::channel(4);
        // Capacity 1 keeps discovery at most one snapshot ahead of HAProxy
        let (snapshot_tx, snapshot_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        let mut discovery_task = discovery.start(snapshot_tx, cancel.clone());

        let haproxy = &self.config.haproxy;
        let launcher = HaproxyLauncher::new(
            self.config.clone(),
            exit_tx.clone(),
            tracker.clone(),
            cancel.clone(),
        );
        let admin = RuntimeClient::new(&haproxy.admin_socket, haproxy.admin_timeout);
        let reconciler = Reconciler::new(haproxy, launcher, admin);
        let mut reconcile_task = tokio::spawn(reconciler.run(snapshot_rx, cancel.clone()));

        let signal_task = tokio::spawn(async move {
            let name = signals.await;
            let _ = exit_tx.send(ExitReason::Signal(name)).await;
        });

        let mut discovery_done = false;
        let mut reconcile_done = false;
        let outcome = tokio::select! {
            Some(reason) = exit_rx.recv() => {
                info!("Shutting down: {}", reason);
                Ok(())
            }
            joined = &mut discovery_task => {
                discovery_done = true;
                task_outcome("Discovery", joined)
            }
            joined = &mut reconcile_task => {
                reconcile_done = true;
                task_outcome("Reconciler", joined)
            }
        };

        cancel.cancel();
        signal_task.abort();
        tracker.close();

        let discovery_abort = discovery_task.abort_handle();
        let reconcile_abort = reconcile_task.abort_handle();
        let drain = async move {
            if !discovery_done {
                let _ = discovery_task.await;
            }
            if !reconcile_done {
                let _ = reconcile_task.await;
            }
            tracker.wait().await;
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!("Tasks still running after {:?}, aborting", SHUTDOWN_GRACE);
            discovery_abort.abort();
            reconcile_abort.abort();
        }

        remove_files(&[haproxy.admin_socket.as_path(), haproxy.conf_path.as_path()]).await;

        outcome
    }
}

/// Map a finished task to the process outcome
fn task_outcome<E>(name: &str, joined: Result<Result<(), E>, JoinError>) -> Result<()>
where
    E: Into<anyhow::Error>,
{
    match joined {
        Ok(Ok(())) => {
            info!("{} stopped", name);
            Ok(())
        }
        Ok(Err(e)) => {
            let e = e.into();
            error!("{} failed: {:#}", name, e);
            Err(e.context(format!("{name} failed")))
        }
        Err(e) => Err(anyhow::anyhow!("{name} task did not complete: {e}")),
    }
}

/// Remove files written for HAProxy, ignoring ones already gone
async fn remove_files(paths: &[&Path]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => info!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}

/// Install the SIGINT and SIGTERM handlers and resolve with the name of the
/// first signal received
///
/// Handlers are registered before this returns, so a signal that arrives
/// before the future is first polled is not lost.
fn shutdown_signal() -> impl Future<Output = &'static str> + Send {
    let interrupt = listen(SignalKind::interrupt(), "SIGINT");
    let terminate = listen(SignalKind::terminate(), "SIGTERM");

    async move {
        tokio::select! {
            name = interrupt => name,
            name = terminate => name,
        }
    }
}

fn listen(kind: SignalKind, name: &'static str) -> impl Future<Output = &'static str> + Send {
    let stream = signal(kind);
    async move {
        match stream {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received {} signal", name);
                name
            }
            Err(e) => {
                error!("Failed to install {} handler: {}", name, e);
                std::future::pending().await
            }
        }
    }
}

//! Slot table reconciliation
//!
//! Consumes discovery snapshots one at a time. The first snapshot bootstraps
//! HAProxy; every snapshot, the first included, is then pushed to the runtime
//! API as a single batch covering all slots.

use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use slotsync_core::HaproxyConfig;
use slotsync_discovery::SlotTable;

use crate::haproxy::commands::{slot_batch, READY_CHECK};
use crate::haproxy::{AdminChannel, Launcher};

pub struct Reconciler<L, A> {
    slots: usize,
    launcher: L,
    admin: A,
    poll_interval: Duration,
    ready_timeout: Duration,
    bootstrapped: bool,
}

impl<L: Launcher, A: AdminChannel> Reconciler<L, A> {
    pub fn new(config: &HaproxyConfig, launcher: L, admin: A) -> Self {
        Self {
            slots: config.slots,
            launcher,
            admin,
            poll_interval: config.ready_poll_interval,
            ready_timeout: config.ready_timeout,
            bootstrapped: false,
        }
    }

    /// Apply snapshots until the channel closes or `cancel` fires
    ///
    /// Errors are fatal: HAProxy could not be started or never became ready.
    pub async fn run(
        mut self,
        mut snapshots: mpsc::Receiver<SlotTable>,
        cancel: CancellationToken,
    ) -> Result<()> {
        loop {
            let table = tokio::select! {
                () = cancel.cancelled() => break,
                table = snapshots.recv() => match table {
                    Some(table) => table,
                    None => {
                        debug!("Snapshot channel closed");
                        break;
                    }
                },
            };

            tokio::select! {
                () = cancel.cancelled() => break,
                result = self.apply(&table) => result?,
            }
        }

        Ok(())
    }

    async fn apply(&mut self, table: &SlotTable) -> Result<()> {
        if !self.bootstrapped {
            self.bootstrap().await?;
        }

        for (index, host) in table.iter() {
            debug!(slot = index, "{}", host);
        }

        let batch = slot_batch(table, self.slots);
        match self.admin.execute(&batch).await {
            Ok(_) => {
                info!(occupied = table.occupied(), slots = self.slots, "Slot table applied");
            }
            // The next snapshot carries the full state again
            Err(e) => warn!("Failed to apply slot table: {}", e),
        }

        Ok(())
    }

    async fn bootstrap(&mut self) -> Result<()> {
        info!("Starting HAProxy");
        self.launcher.launch().await?;
        self.wait_ready().await?;
        self.bootstrapped = true;
        info!("HAProxy runtime API is ready");
        Ok(())
    }

    async fn wait_ready(&self) -> Result<()> {
        let deadline = Instant::now() + self.ready_timeout;
        loop {
            tokio::time::sleep(self.poll_interval).await;
            match self.admin.execute(READY_CHECK).await {
                Ok(_) => return Ok(()),
                Err(e) => debug!("HAProxy not ready yet: {}", e),
            }
            if Instant::now() >= deadline {
                bail!("HAProxy runtime API not ready after {:?}", self.ready_timeout);
            }
        }
    }
}

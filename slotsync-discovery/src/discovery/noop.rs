//! Discovery that never finds anyone

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use slotsync_core::DiscoveryMethod;

use super::Discovery;
use crate::error::Result;
use crate::host::SlotTable;

/// Publishes one table of empty slots, then idles until cancelled
#[derive(Debug, Clone)]
pub struct NoopDiscovery {
    slots: usize,
}

impl NoopDiscovery {
    #[must_use]
    pub const fn new(slots: usize) -> Self {
        Self { slots }
    }
}

impl Discovery for NoopDiscovery {
    fn method(&self) -> DiscoveryMethod {
        DiscoveryMethod::Noop
    }

    fn start(
        self: Box<Self>,
        snapshots: mpsc::Sender<SlotTable>,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            if snapshots.send(SlotTable::empty(self.slots)).await.is_err() {
                return Ok(());
            }
            cancel.cancelled().await;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sends_one_empty_table() {
        let (tx, mut rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = Box::new(NoopDiscovery::new(4)).start(tx, cancel.clone());

        let table = rx.recv().await.unwrap();
        assert_eq!(table, SlotTable::empty(4));
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        handle.await.unwrap().unwrap();
        // sender dropped with the task
        assert!(rx.recv().await.is_none());
    }
}

//! Keeps HAProxy's backend slots in sync with peers found through discovery

pub mod haproxy;
pub mod reconcile;
pub mod supervisor;

pub use reconcile::Reconciler;
pub use supervisor::{ExitReason, Supervisor};

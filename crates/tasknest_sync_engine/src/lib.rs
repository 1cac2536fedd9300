//! # Tasknest Sync Engine
//!
//! Multi-device sync coordinator for tasknest.
//!
//! This crate provides:
//! - Change ledger (compacting buffer of pending local mutations)
//! - Sync state machine (idle → syncing → success | error)
//! - Transport abstraction with HTTP-shaped and simulated implementations
//! - Local-store boundary for applying remote changes
//! - Auto-sync timer with failure backoff
//! - Lifecycle events for UI collaborators
//!
//! ## Architecture
//!
//! The coordinator implements a **push-then-pull** cycle:
//! 1. Push buffered local changes (ledger compacts on acknowledgment)
//! 2. Pull remote changes, conflict-checking each against the ledger
//! 3. Attempt last-write-wins resolution for pending conflicts
//!
//! ## Key Invariants
//!
//! - Exactly one pending ledger entry per entity
//! - At most one sync cycle in flight; concurrent attempts are rejected,
//!   never queued
//! - A failed cycle leaves the ledger untouched, so the next cycle retries
//!   the same batch
//! - Conflicts are outcomes, not errors: they are tracked and surfaced,
//!   and never abort a cycle

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod coordinator;
mod error;
mod events;
mod http;
mod ledger;
mod sim;
mod state;
mod stats;
mod storage;
mod transport;

pub use config::{RetryConfig, SyncConfig};
pub use coordinator::{SyncCoordinator, SyncCycleReport};
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, SyncEvent};
pub use http::{HttpClient, HttpMethod, HttpTransport};
pub use ledger::ChangeLedger;
pub use sim::SimulatedTransport;
pub use state::{SyncState, SyncStatus};
pub use stats::{SyncHistoryEntry, SyncStats};
pub use storage::{LocalStore, MemoryStore};
pub use transport::{MockTransport, SyncTransport};

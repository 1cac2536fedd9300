//! # Tasknest Sync Protocol
//!
//! Protocol types and merge semantics for tasknest multi-device sync.
//!
//! This crate provides:
//! - `SyncRecord` for replicated entity mutations
//! - `ConflictRecord` and pure conflict detection
//! - Per-entity-kind field merge (`merge_data`)
//! - Protocol messages (push, pull, full sync, devices, conflicts)
//! - Order-independent payload checksums
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod checksum;
mod conflict;
mod merge;
mod messages;
mod types;

pub use checksum::payload_checksum;
pub use conflict::{
    auto_resolve, detect_conflict, merged_record, validate_resolution, ConflictCheck,
    ConflictRecord, Resolution, ResolutionStrategy,
};
pub use merge::{merge_data, MergeOutcome};
pub use messages::{
    FullSyncRequest, PushRequest, ResolveConflictRequest, SyncEnvelope, PROTOCOL_VERSION,
};
pub use types::{ChangeOp, DeviceInfo, DeviceKind, EntityKind, SyncRecord};

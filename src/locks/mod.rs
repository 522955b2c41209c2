//! Atomic multi-file lock registry.
//!
//! One hash per namespace (`locks:<repo>:<branch>`), field = file path,
//! value = serialized lock record. All mutations run as atomic KV scripts
//! so a multi-file acquire is all-or-nothing and observers never see a
//! partial lock set.

pub mod models;
pub mod registry;

pub use models::{AcquireOutcome, AcquireRequest, Lock, LockStatus, LOCK_TTL_MS};
pub use registry::LockRegistry;

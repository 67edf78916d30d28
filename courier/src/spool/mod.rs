//! Deferred delivery: the unsent spool, the bounce store, and the periodic
//! cycle that drains one into the transport and the other.
//!
//! # Architecture
//!
//! - [`SpoolEntry`] / [`BounceEntry`]: what is stored, keyed by a generated id.
//! - [`EntryStore`]: keyed storage with an atomic per-key `take`.
//! - [`MemoryStore`] and [`FileStore`]: in-memory and directory-backed stores.
//! - [`SpoolManager`]: enqueue, and one sequential delivery cycle.
//! - [`SpoolScheduler`]: runs cycles on an interval and reports to [`SpoolHooks`].
//!
//! Failed deliveries are never retried here; they are moved to the bounce
//! store and left for an operator.

mod entry;
mod file;
mod manager;
mod memory;
mod scheduler;
mod traits;

pub use entry::{BounceEntry, CycleSummary, SpoolEntry, SpoolOptions};
pub use file::FileStore;
pub use manager::SpoolManager;
pub(crate) use manager::remove_files;
pub use memory::MemoryStore;
pub use scheduler::{LogHooks, SpoolHooks, SpoolScheduler};
pub use traits::EntryStore;

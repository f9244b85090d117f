//! State persistence
//!
//! Portfolio and strategy snapshots for restart continuity

mod snapshot;

pub use snapshot::{EngineSnapshot, SnapshotError, SnapshotStore};

pub mod files;
pub mod snapshot;

pub use files::RecordFiles;
pub use snapshot::SnapshotStore;

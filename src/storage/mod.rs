pub mod persistence;
pub mod table;

pub use persistence::{DatabaseSnapshot, SnapshotManager};
pub use table::{Table, TableSchema};

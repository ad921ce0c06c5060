pub mod database;

pub use database::{Database, Location, WriteOp};

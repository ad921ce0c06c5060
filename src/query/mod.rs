//! Typed criteria queries over entity rows.

pub mod criteria;
pub mod pattern;
pub mod selection;

pub use criteria::{CompareOp, Order, QCriteria, Restriction};
pub use selection::{QSelection, SelectionItem};

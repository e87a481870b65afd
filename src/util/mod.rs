// Small helpers shared across modules

pub mod bytes;
pub mod sorted;

pub use sorted::{Descending, Natural, SortOrder, SortedSet};

//! Delete-by-query ordering against reordered leader adds.

mod tracker;

pub use tracker::{Admission, DbqWatermark, DeleteByQueryTracker};

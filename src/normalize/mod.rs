//! Pure conversions from raw upstream JSON into the record types in [`crate::types`].
//! Nothing in here performs I/O.

pub mod ardor;
pub mod polygon;
pub mod users;

//! Virtual-filesystem path walk (design §4.8).

pub mod traverse;

pub use traverse::{TraverseResult, openat, traverse};

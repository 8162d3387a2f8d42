//! # Formats Module
//!
//! Versioned binary encoding of evaluation snapshots. Pure transformations;
//! storage lives in `storage`.

mod persistence;

pub use persistence::*;

//! Incremental WebM container writing.

pub mod ids;
pub mod sink;
pub mod webm;

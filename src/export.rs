//! Frame-by-frame export: encoder interface and the orchestration loop.

pub mod encoder;
pub mod orchestrator;

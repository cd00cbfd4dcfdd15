//! The iteration controller

mod engine;

pub use engine::{LoopEngine, LoopSummary};

// src/core/worker/mod.rs

//! The orchestration-backed executor variant: instead of dispatching one
//! request per step, the whole group is rendered as a stack template and
//! handed to the orchestration service.

mod heat;
mod template;

pub use heat::{HeatClient, HeatExecutor};
pub use template::generate_template;

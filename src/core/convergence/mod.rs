// src/core/convergence/mod.rs

//! Convergence: diffing observed cloud state against desired state, and
//! executing the corrective steps.

pub mod executor;
pub mod gather;
pub mod planner;
pub mod selfheal;
pub mod steps;
pub mod types;

pub use executor::{
    CloudClients, ConvergenceOutcome, GroupConverger, ObservedGroup, StepExecutor, StepOutcome,
    observe_group_state,
};
pub use planner::{DEFAULT_BUILD_TIMEOUT_SECS, DesiredGroupState, Plan, plan};
pub use selfheal::SelfHeal;
pub use steps::{ServiceTarget, Step, StepRequest};
pub use types::{LbConfig, LbNode, NodeCondition, NodeType, NovaServer, ServerStatus};

// src/core/state.rs

//! Defines the central `ControllerState` struct shared by the server wiring
//! and the health probe.

use crate::config::Config;
use crate::core::controller::Controller;
use crate::core::convergence::SelfHeal;
use crate::core::coordination::CoordinationClient;
use crate::core::scheduler::SchedulerService;
use crate::core::store::ScalingStore;
use std::sync::Arc;

/// Everything a running instance holds: configuration, the storage and
/// coordination seams, and the control loops themselves.
pub struct ControllerState {
    pub config: Config,
    pub store: Arc<dyn ScalingStore>,
    pub coordination: Arc<dyn CoordinationClient>,
    pub controller: Arc<Controller>,
    pub scheduler: Arc<SchedulerService>,
    pub selfheal: Arc<SelfHeal>,
}

//! Core configuration for rigpose-animator-core.

use serde::{Deserialize, Serialize};

use crate::diagnostics::DiagnosticsCfg;

/// Per-instance configuration. Defaults reproduce the reference solver constants.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Offload rule evaluation to the instance's task scheduler unless `apply(true)` asks for
    /// the direct path.
    pub use_parallel_task: bool,
    /// Mark bones flagged `dynamic` on the rig as protected so write-back leaves them alone.
    pub protect_dynamic_bones: bool,

    /// Initial capacity hints for bone/VPS state lists.
    pub bone_capacity: usize,
    pub vps_capacity: usize,

    pub ik: IkConfig,
    pub diagnostics: DiagnosticsCfg,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            use_parallel_task: false,
            protect_dynamic_bones: false,
            bone_capacity: 64,
            vps_capacity: 16,
            ik: IkConfig::default(),
            diagnostics: DiagnosticsCfg::default(),
        }
    }
}

/// Iteration caps and thresholds of the IK solvers.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IkConfig {
    /// FABRIK iteration cap.
    pub max_iterations: usize,
    /// CCD step cap; each step rotates at most `ccd_max_step`, so it needs more of them.
    pub ccd_max_iterations: usize,
    /// Tip-to-goal distance counted as solved.
    pub tolerance: f32,
    /// Smallest per-iteration improvement before the solver gives up.
    pub min_improvement: f32,
    /// Largest CCD rotation per link and step, radians.
    pub ccd_max_step: f32,
    pub ccd_damping: f32,
    /// Weight of the chain base; the tip always has weight 1.
    pub min_link_weight: f32,
    /// Reach ranges below this disable the reach clamp.
    pub reach_epsilon: f32,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            ccd_max_iterations: 500,
            tolerance: 1e-3,
            min_improvement: 1e-5,
            ccd_max_step: 1f32.to_radians(),
            ccd_damping: 0.9,
            min_link_weight: 0.1,
            reach_epsilon: 1e-4,
        }
    }
}

//! Rigpose Animator Core (engine-agnostic)
//!
//! Computes skeletal poses for a component from keyframe animation, host controllers and an
//! ordered list of rules (animation playback, procedural transforms, limits, mirroring, aiming
//! and inverse kinematics). Results are blended onto the component's bones and vertex position
//! set weights, either on the caller's thread or as a task that is cancelled cleanly when a newer
//! pass supersedes it.

pub mod animation;
pub mod blend;
pub mod component;
pub mod config;
pub mod controller;
pub mod descriptor;
pub mod diagnostics;
pub mod error;
pub mod ik;
pub mod instance;
pub mod link;
pub mod math;
pub mod rig;
pub mod rule;
pub mod state;
pub mod task;

// Re-exports for hosts
pub use animation::{Animation, AnimationTracks, BoneKeyframe, KeyframeTrack, Move};
pub use blend::{blend_pose, blend_weight, BlendMode, ChannelMask, Pose};
pub use component::{lock_component, Component, SharedComponent};
pub use config::{Config, IkConfig};
pub use controller::{Controller, ControllerStates};
pub use descriptor::{Animator, AnimatorDef};
pub use diagnostics::{DiagnosticsCfg, NullObserver, Phase, PhaseObserver, RecordingObserver};
pub use error::{AnimatorError, Result};
pub use ik::{IkChain, IkGoal, IkSolverKind, SolveReport, SolveStatus};
pub use instance::AnimatorInstance;
pub use link::{ControllerTarget, Curve, CurvePoint, LinkDef};
pub use rig::{BoneIkLimits, Model, Rig, RigBone};
pub use rule::{Rule, RuleCommonDef, RuleDef, RuleSet};
pub use state::{BoneStateList, VpsStateList};
pub use task::{InlineScheduler, TaskHandle, TaskScheduler, TaskStatus, ThreadScheduler};

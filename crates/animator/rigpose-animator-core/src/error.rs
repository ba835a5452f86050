//! Error types shared by the pose core.

use std::collections::TryReserveError;

use thiserror::Error;

/// Recoverable failures surfaced by `AnimatorInstance` entry points and asset building.
///
/// Degenerate geometry, unreachable IK goals and missing animation channels are never errors;
/// rules fall back to a default pose or skip the bone instead.
#[derive(Debug, Error)]
pub enum AnimatorError {
    #[error("keyframes of channel '{channel}' are not sorted by finite time (keyframe {index})")]
    InvalidKeyframes { channel: String, index: usize },

    #[error("failed to allocate pose state: {0}")]
    Allocation(#[from] TryReserveError),

    #[error("unknown move '{0}'")]
    UnknownMove(String),

    #[error("invalid animator descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),

    #[error("rule evaluation task {0} failed")]
    TaskFailed(u64),
}

pub type Result<T> = std::result::Result<T, AnimatorError>;

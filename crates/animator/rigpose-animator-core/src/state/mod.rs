//! Per-instance working state: bones and vertex position sets.

pub mod bone;
pub mod bone_list;
pub mod vps;

pub use bone::BoneState;
pub use bone_list::BoneStateList;
pub use vps::{VpsState, VpsStateList};

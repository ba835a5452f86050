//! Animation assets: authored source data and the keyframe tracks built from it.

pub mod source;
pub mod track;
pub mod tracks;

pub use source::{Animation, BoneChannel, BoneKeyframe, Move, VpsChannel, WeightKeyframe};
pub use track::{Keyframe, KeyframeTrack, TrackValue};
pub use tracks::{AnimationTracks, BoneTrack, MoveTracks, VpsTrack};

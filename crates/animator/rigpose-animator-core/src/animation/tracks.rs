//! Built, immutable per-move keyframe tracks. One `AnimationTracks` is built per animation asset
//! and shared (`Arc`) by every animator and instance using it.

use glam::{Quat, Vec3};
use hashbrown::HashMap;

use super::source::{Animation, Move};
use super::track::KeyframeTrack;
use crate::blend::Pose;
use crate::error::Result;

#[derive(Clone, Debug)]
pub struct BoneTrack {
    pub bone: String,
    pub position: KeyframeTrack<Vec3>,
    pub rotation: KeyframeTrack<Quat>,
    pub scale: KeyframeTrack<Vec3>,
}

impl BoneTrack {
    /// Pose at `time`; empty channels fall back to the identity pose.
    pub fn sample(&self, time: f32) -> Pose {
        Pose {
            position: self.position.sample(time).unwrap_or(Vec3::ZERO),
            orientation: self.rotation.sample(time).unwrap_or(Quat::IDENTITY),
            scale: self.scale.sample(time).unwrap_or(Vec3::ONE),
        }
    }
}

#[derive(Clone, Debug)]
pub struct VpsTrack {
    pub vps: String,
    pub weight: KeyframeTrack<f32>,
}

impl VpsTrack {
    pub fn sample(&self, time: f32) -> f32 {
        self.weight.sample(time).unwrap_or(0.0)
    }
}

#[derive(Clone, Debug)]
pub struct MoveTracks {
    pub name: String,
    pub playtime: f32,
    bones: Vec<BoneTrack>,
    vps: Vec<VpsTrack>,
    bone_lookup: HashMap<String, usize>,
    vps_lookup: HashMap<String, usize>,
}

impl MoveTracks {
    fn build(source: &Move) -> Result<Self> {
        let mut bones = Vec::new();
        bones.try_reserve_exact(source.bones.len())?;
        let mut bone_lookup = HashMap::with_capacity(source.bones.len());

        for channel in &source.bones {
            let keys = &channel.keyframes;
            let track = BoneTrack {
                bone: channel.bone.clone(),
                position: KeyframeTrack::from_samples(
                    &channel.bone,
                    keys.iter().map(|k| (k.time, k.position)),
                )?,
                rotation: KeyframeTrack::from_euler_samples(
                    &channel.bone,
                    keys.iter().map(|k| (k.time, k.rotation)),
                )?,
                scale: KeyframeTrack::from_samples(
                    &channel.bone,
                    keys.iter().map(|k| (k.time, k.scale)),
                )?,
            };
            bone_lookup.entry(channel.bone.clone()).or_insert(bones.len());
            bones.push(track);
        }

        let mut vps = Vec::new();
        vps.try_reserve_exact(source.vertex_position_sets.len())?;
        let mut vps_lookup = HashMap::with_capacity(source.vertex_position_sets.len());
        for channel in &source.vertex_position_sets {
            let track = VpsTrack {
                vps: channel.vps.clone(),
                weight: KeyframeTrack::from_samples(
                    &channel.vps,
                    channel.keyframes.iter().map(|k| (k.time, k.weight)),
                )?,
            };
            vps_lookup.entry(channel.vps.clone()).or_insert(vps.len());
            vps.push(track);
        }

        Ok(Self {
            name: source.name.clone(),
            playtime: source.playtime.max(0.0),
            bones,
            vps,
            bone_lookup,
            vps_lookup,
        })
    }

    pub fn bone_track_index(&self, bone: &str) -> Option<usize> {
        self.bone_lookup.get(bone).copied()
    }

    pub fn vps_track_index(&self, vps: &str) -> Option<usize> {
        self.vps_lookup.get(vps).copied()
    }

    pub fn bone_track(&self, index: usize) -> &BoneTrack {
        &self.bones[index]
    }

    pub fn vps_track(&self, index: usize) -> &VpsTrack {
        &self.vps[index]
    }

    pub fn bone_tracks(&self) -> &[BoneTrack] {
        &self.bones
    }

    pub fn vps_tracks(&self) -> &[VpsTrack] {
        &self.vps
    }

    /// Time inside the move for a normalized `[0,1]` controller value.
    pub fn time_at(&self, normalized: f32) -> f32 {
        self.playtime * normalized.clamp(0.0, 1.0)
    }
}

#[derive(Clone, Debug, Default)]
pub struct AnimationTracks {
    moves: Vec<MoveTracks>,
    lookup: HashMap<String, usize>,
}

impl AnimationTracks {
    pub fn build(source: &Animation) -> Result<Self> {
        let mut moves = Vec::new();
        moves.try_reserve_exact(source.moves.len())?;
        let mut lookup = HashMap::with_capacity(source.moves.len());
        for mv in &source.moves {
            lookup.entry(mv.name.clone()).or_insert(moves.len());
            moves.push(MoveTracks::build(mv)?);
        }
        log::debug!("built animation tracks for {} moves", moves.len());
        Ok(Self { moves, lookup })
    }

    pub fn move_index(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    pub fn find_move(&self, name: &str) -> Option<&MoveTracks> {
        self.move_index(name).map(|i| &self.moves[i])
    }

    pub fn move_at(&self, index: usize) -> &MoveTracks {
        &self.moves[index]
    }

    pub fn moves(&self) -> &[MoveTracks] {
        &self.moves
    }
}

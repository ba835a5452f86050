//! Keyframe tracks with precomputed linear steps.
//!
//! Each keyframe stores `step = (next - value) / (next_time - time)` so sampling is one lookup
//! plus `value + step * (t - time)`. The last keyframe has a zero step; queries past either end
//! clamp to the edge keyframe.

use glam::{Quat, Vec3};

use crate::error::{AnimatorError, Result};
use crate::math::quat_from_euler;

/// Values a [`KeyframeTrack`] can interpolate.
pub trait TrackValue: Copy {
    fn zero_step() -> Self;
    fn step_to(self, next: Self, dt: f32) -> Self;
    fn advance(self, step: Self, offset: f32) -> Self;
}

impl TrackValue for f32 {
    fn zero_step() -> Self {
        0.0
    }
    fn step_to(self, next: Self, dt: f32) -> Self {
        (next - self) / dt
    }
    fn advance(self, step: Self, offset: f32) -> Self {
        self + step * offset
    }
}

impl TrackValue for Vec3 {
    fn zero_step() -> Self {
        Vec3::ZERO
    }
    fn step_to(self, next: Self, dt: f32) -> Self {
        (next - self) / dt
    }
    fn advance(self, step: Self, offset: f32) -> Self {
        self + step * offset
    }
}

impl TrackValue for Quat {
    fn zero_step() -> Self {
        Quat::from_xyzw(0.0, 0.0, 0.0, 0.0)
    }
    fn step_to(self, next: Self, dt: f32) -> Self {
        (next - self) * (1.0 / dt)
    }
    fn advance(self, step: Self, offset: f32) -> Self {
        (self + step * offset).normalize()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keyframe<T> {
    pub time: f32,
    pub value: T,
    pub step: T,
}

#[derive(Clone, Debug)]
pub struct KeyframeTrack<T> {
    keyframes: Vec<Keyframe<T>>,
}

impl<T> Default for KeyframeTrack<T> {
    fn default() -> Self {
        Self {
            keyframes: Vec::new(),
        }
    }
}

impl<T: TrackValue> KeyframeTrack<T> {
    /// Build from `(time, value)` pairs sorted by time. `channel` only names the track in errors.
    pub fn from_samples<I>(channel: &str, samples: I) -> Result<Self>
    where
        I: IntoIterator<Item = (f32, T)>,
    {
        let samples: Vec<(f32, T)> = samples.into_iter().collect();
        let mut keyframes = Vec::new();
        keyframes.try_reserve_exact(samples.len())?;

        let mut last_time = f32::NEG_INFINITY;
        for (index, (time, _)) in samples.iter().enumerate() {
            if !time.is_finite() || *time < last_time {
                return Err(AnimatorError::InvalidKeyframes {
                    channel: channel.to_string(),
                    index,
                });
            }
            last_time = *time;
        }

        for (i, &(time, value)) in samples.iter().enumerate() {
            let step = match samples.get(i + 1) {
                Some(&(next_time, next_value)) if next_time - time > f32::EPSILON => {
                    value.step_to(next_value, next_time - time)
                }
                _ => T::zero_step(),
            };
            keyframes.push(Keyframe { time, value, step });
        }
        Ok(Self { keyframes })
    }

    /// Value at `time`, or `None` for an empty track. A non-finite time reads the first keyframe.
    pub fn sample(&self, time: f32) -> Option<T> {
        let first = self.keyframes.first()?;
        if !time.is_finite() || time <= first.time {
            return Some(first.value);
        }

        // Last keyframe with key.time <= time; a query hitting a run of equal times resolves to
        // the earliest keyframe of the run.
        let mut index = self.keyframes.partition_point(|k| k.time <= time) - 1;
        if self.keyframes[index].time == time {
            while index > 0 && self.keyframes[index - 1].time == time {
                index -= 1;
            }
        }

        let key = &self.keyframes[index];
        let offset = time - key.time;
        if offset == 0.0 {
            return Some(key.value);
        }
        Some(key.value.advance(key.step, offset))
    }

    pub fn keyframes(&self) -> &[Keyframe<T>] {
        &self.keyframes
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }
}

impl KeyframeTrack<Quat> {
    /// Build a rotation track from Euler keyframes.
    ///
    /// One forward pass flips any quaternion whose dot product with the already corrected
    /// predecessor is negative, so every segment interpolates along the short arc.
    pub fn from_euler_samples<I>(channel: &str, samples: I) -> Result<Self>
    where
        I: IntoIterator<Item = (f32, Vec3)>,
    {
        let mut previous: Option<Quat> = None;
        let corrected = samples.into_iter().map(|(time, euler)| {
            let mut q = quat_from_euler(euler);
            if let Some(prev) = previous {
                if prev.dot(q) < 0.0 {
                    q = -q;
                }
            }
            previous = Some(q);
            (time, q)
        });
        let corrected: Vec<(f32, Quat)> = corrected.collect();
        Self::from_samples(channel, corrected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsorted_keyframes_are_rejected() {
        let err = KeyframeTrack::<f32>::from_samples("w", [(1.0, 0.0), (0.5, 1.0)]).unwrap_err();
        match err {
            AnimatorError::InvalidKeyframes { index, .. } => assert_eq!(index, 1),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn duplicate_times_pick_the_earlier_keyframe() {
        let track = KeyframeTrack::<f32>::from_samples("w", [(0.0, 0.0), (1.0, 2.0), (1.0, 5.0)])
            .unwrap();
        assert_eq!(track.sample(1.0), Some(2.0));
    }

    #[test]
    fn empty_track_samples_nothing() {
        let track = KeyframeTrack::<Vec3>::default();
        assert!(track.sample(0.3).is_none());
    }
}

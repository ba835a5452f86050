use glam::{Quat, Vec3};
use rigpose_animator_core::{
    animation::{Animation, AnimationTracks, KeyframeTrack},
    blend::{blend_pose, blend_weight, BlendMode, ChannelMask, Pose},
    error::AnimatorError,
};

fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

fn approx_vec(a: Vec3, b: Vec3, eps: f32) {
    assert!((a - b).length() <= eps, "left={a:?} right={b:?} eps={eps}");
}

/// it should clamp outside the keyed range and return stored values exactly at keyframes
#[test]
fn scalar_track_clamps_and_hits_keys() {
    let track =
        KeyframeTrack::from_samples("w", [(0.0, 0.0_f32), (1.0, 2.0), (3.0, 4.0)]).unwrap();
    assert_eq!(track.sample(-5.0), Some(0.0));
    assert_eq!(track.sample(1.0), Some(2.0));
    assert_eq!(track.sample(3.0), Some(4.0));
    assert_eq!(track.sample(10.0), Some(4.0));
    approx(track.sample(0.5).unwrap(), 1.0, 1e-6);
    approx(track.sample(2.0).unwrap(), 3.0, 1e-6);
}

/// it should read the first keyframe for a NaN or infinite time instead of panicking
#[test]
fn non_finite_time_reads_first_key() {
    let track =
        KeyframeTrack::from_samples("w", [(0.0, 1.0_f32), (1.0, 2.0), (3.0, 4.0)]).unwrap();
    assert_eq!(track.sample(f32::NAN), Some(1.0));
    assert_eq!(track.sample(f32::INFINITY), Some(1.0));
    assert_eq!(track.sample(f32::NEG_INFINITY), Some(1.0));

    let source: Animation = rigpose_test_fixtures::animations::load("wave").unwrap();
    let tracks = AnimationTracks::build(&source).unwrap();
    let wave = tracks.find_move("wave").expect("wave move");
    let elbow = wave.bone_track_index("elbow").unwrap();
    let pose = wave.bone_track(elbow).sample(wave.time_at(f32::NAN));
    assert!(pose.position.is_finite());
    assert!(pose.orientation.is_finite());
}

/// it should resolve duplicate keyframe times to the earlier keyframe
#[test]
fn duplicate_times_resolve_to_earlier_key() {
    let track =
        KeyframeTrack::from_samples("w", [(0.0, 0.0_f32), (1.0, 5.0), (1.0, 7.0), (2.0, 7.0)])
            .unwrap();
    assert_eq!(track.sample(1.0), Some(5.0));
}

/// it should reject unsorted or non-finite keyframe times
#[test]
fn invalid_keyframes_are_errors() {
    let unsorted = KeyframeTrack::from_samples("jaw", [(1.0, 0.0_f32), (0.5, 1.0)]);
    match unsorted {
        Err(AnimatorError::InvalidKeyframes { channel, index }) => {
            assert_eq!(channel, "jaw");
            assert_eq!(index, 1);
        }
        other => panic!("expected InvalidKeyframes, got {other:?}"),
    }
    assert!(KeyframeTrack::from_samples("jaw", [(f32::NAN, 0.0_f32)]).is_err());
}

/// it should interpolate the short arc between 0 and 350 degrees
#[test]
fn euler_track_takes_short_arc() {
    let track = KeyframeTrack::<Quat>::from_euler_samples(
        "spine",
        [
            (0.0, Vec3::ZERO),
            (1.0, Vec3::new(0.0, 350_f32.to_radians(), 0.0)),
        ],
    )
    .unwrap();
    let mid = track.sample(0.5).unwrap();
    let travelled = mid.angle_between(Quat::IDENTITY).to_degrees();
    assert!(travelled <= 90.0, "travelled {travelled} degrees");
    approx(travelled, 5.0, 0.1);
}

/// it should build move tracks from fixture data with rest pose for missing channels
#[test]
fn animation_fixture_builds_tracks() {
    let source: Animation = rigpose_test_fixtures::animations::load("wave").unwrap();
    let tracks = AnimationTracks::build(&source).unwrap();
    let wave = tracks.find_move("wave").expect("wave move");
    approx(wave.playtime, 2.0, 1e-6);
    approx(wave.time_at(0.5), 1.0, 1e-6);

    let elbow = wave.bone_track_index("elbow").unwrap();
    let pose = wave.bone_track(elbow).sample(1.0);
    approx(
        pose.orientation.angle_between(Quat::from_rotation_z(0.5)),
        0.0,
        1e-4,
    );
    assert!(wave.bone_track_index("wrist").is_none());

    let smile = wave.vps_track_index("smile").unwrap();
    approx(wave.vps_track(smile).sample(1.0), 0.5, 1e-6);
}

/// it should accumulate overlays: (0.5,0,0) then (1,0,0) from two half-strength overlays
#[test]
fn overlay_accumulates() {
    let incoming = Pose::new(Vec3::X, Quat::IDENTITY, Vec3::ONE);
    let once = blend_pose(
        &Pose::IDENTITY,
        &incoming,
        BlendMode::Overlay,
        0.5,
        ChannelMask::ALL,
    );
    approx_vec(once.position, Vec3::new(0.5, 0.0, 0.0), 1e-6);
    let twice = blend_pose(&once, &incoming, BlendMode::Overlay, 0.5, ChannelMask::ALL);
    approx_vec(twice.position, Vec3::new(1.0, 0.0, 0.0), 1e-6);
    approx_vec(twice.scale, Vec3::ONE, 1e-6);
}

/// it should keep current at factor 0 and take incoming exactly at factor 1
#[test]
fn blend_endpoints_are_exact() {
    let current = Pose::new(
        Vec3::new(1.0, 2.0, 3.0),
        Quat::from_rotation_y(0.3),
        Vec3::splat(2.0),
    );
    let incoming = Pose::new(Vec3::ZERO, Quat::from_rotation_x(1.0), Vec3::ONE);
    for mode in [BlendMode::Blend, BlendMode::Overlay] {
        assert_eq!(
            blend_pose(&current, &incoming, mode, 0.0, ChannelMask::ALL),
            current
        );
    }
    assert_eq!(
        blend_pose(&current, &incoming, BlendMode::Blend, 1.0, ChannelMask::ALL),
        incoming
    );
    // blending a pose onto itself changes nothing
    let same = blend_pose(&current, &current, BlendMode::Blend, 0.37, ChannelMask::ALL);
    approx_vec(same.position, current.position, 1e-6);
    approx(same.orientation.angle_between(current.orientation), 0.0, 1e-4);
}

/// it should only touch channels enabled in the mask
#[test]
fn mask_gates_channels() {
    let incoming = Pose::new(Vec3::X, Quat::from_rotation_z(1.0), Vec3::splat(3.0));
    let out = blend_pose(
        &Pose::IDENTITY,
        &incoming,
        BlendMode::Blend,
        1.0,
        ChannelMask::ORIENTATION,
    );
    assert_eq!(out.position, Vec3::ZERO);
    assert_eq!(out.scale, Vec3::ONE);
    assert_eq!(out.orientation, incoming.orientation);
}

/// it should blend and overlay morph weights like pose channels
#[test]
fn weights_blend_and_overlay() {
    approx(blend_weight(0.2, 1.0, BlendMode::Blend, 0.5), 0.6, 1e-6);
    approx(blend_weight(0.2, 1.0, BlendMode::Overlay, 0.5), 0.7, 1e-6);
    approx(blend_weight(0.2, 1.0, BlendMode::Blend, 0.0), 0.2, 0.0);
}

use std::sync::Arc;

use glam::{Quat, Vec3};
use rigpose_animator_core::{
    blend::{BlendMode, ChannelMask, Pose},
    component::Component,
    controller::{Controller, ControllerStates},
    link::{BoneParameter, ControllerTarget, Curve, CurveInterpolation, CurvePoint, Link, LinkDef},
    rig::Rig,
    state::{BoneStateList, VpsStateList},
    Model,
};

fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

fn arm_rig() -> Rig {
    let mut rig: Rig = rigpose_test_fixtures::rigs::load("arm").unwrap();
    rig.reindex();
    rig
}

/// it should mark descendants dirty and recompute each ancestor exactly once
#[test]
fn dirty_propagation_recomputes_once() {
    let rig = arm_rig();
    let mut bones = BoneStateList::new();
    bones.rebuild(&rig, &[], false).unwrap();
    bones.update_matrices();
    let clean = bones.matrix_update_count();
    assert_eq!(clean, rig.len() as u64);

    let root = bones.index_of("root").unwrap();
    let wrist = bones.index_of("wrist").unwrap();
    bones.set_orientation(root, Quat::from_rotation_z(0.5));
    assert!(bones.states().iter().all(|s| s.is_dirty()));

    bones.update_matrices_of(wrist);
    // root, shoulder, elbow, wrist; the hand stays dirty
    assert_eq!(bones.matrix_update_count(), clean + 4);
    bones.update_matrices_of(wrist);
    assert_eq!(bones.matrix_update_count(), clean + 4);
    assert!(bones.state(bones.index_of("hand").unwrap()).is_dirty());
}

/// it should compose global matrices parent first with the rest transform in between
#[test]
fn globals_follow_rest_and_pose() {
    let rig = arm_rig();
    let mut bones = BoneStateList::new();
    bones.rebuild(&rig, &[], false).unwrap();
    let shoulder = bones.index_of("shoulder").unwrap();
    let wrist = bones.index_of("wrist").unwrap();

    let rest = bones.global_matrix(wrist).w_axis.truncate();
    assert!((rest - Vec3::new(2.0, 1.0, 0.0)).length() < 1e-5);

    bones.set_orientation(shoulder, Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
    let bent = bones.global_matrix(wrist).w_axis.truncate();
    assert!((bent - Vec3::new(0.0, 3.0, 0.0)).length() < 1e-5, "{bent:?}");
}

/// it should protect dynamic bones from write-back when asked to
#[test]
fn dynamic_bones_are_protected() {
    let rig = Arc::new(arm_rig());
    let mut component = Component::new(rig.clone());
    let hand_pose = Pose::new(Vec3::new(0.0, 0.3, 0.0), Quat::IDENTITY, Vec3::ONE);
    component.set_bone(4, hand_pose);

    let mut bones = BoneStateList::new();
    bones.rebuild(&rig, &[], true).unwrap();
    let hand = bones.index_of("hand").unwrap();
    assert!(bones.state(hand).is_protected());
    bones.reset_poses();
    bones.apply_to_component(&mut component, None);
    assert_eq!(*component.bone(4), hand_pose);
}

/// it should map VPS names through the filter and blend weights back into the component
#[test]
fn vps_list_round_trips_component_weights() {
    let model: Model = rigpose_test_fixtures::rigs::model("arm").unwrap().unwrap();
    let model = Arc::new(model);
    let mut component = Component::new(Arc::new(arm_rig())).with_model(model.clone());
    component.set_vps_weight(1, 0.4);

    let mut vps = VpsStateList::new();
    vps.rebuild(Some(&model), &["blink".to_string()]).unwrap();
    assert_eq!(vps.len(), 1);
    vps.update_from_component(&component);
    approx(vps.weight(0), 0.4, 0.0);

    vps.blend_weight(0, 1.0, BlendMode::Blend, 0.5);
    vps.apply_to_component(&mut component, None);
    approx(component.vps_weight(1), 0.7, 1e-6);
    approx(component.vps_weight(0), 0.0, 0.0);
}

/// it should wrap a repeated link value: 0.75 with repeat 2 becomes 0.5
#[test]
fn repeat_wraps_link_value() {
    let def = LinkDef {
        repeat: 2,
        ..LinkDef::controller(0)
    };
    let link = Link::new(&def, &[Some(0)]);
    let mut states = ControllerStates::new();
    states.push(0.75, Vec3::ZERO);
    approx(link.evaluate(&states, 0.0), 0.5, 1e-6);

    states = ControllerStates::new();
    states.push(1.0, Vec3::ZERO);
    approx(link.evaluate(&states, 0.3), 0.0, 1e-6);
}

/// it should yield state 0 for a controller with a degenerate range
#[test]
fn degenerate_controller_range_is_zero() {
    let mut controller = Controller::new("flat").with_range(0.5, 0.5 + 1e-6);
    controller.set_value(0.5);
    let mut states = ControllerStates::new();
    states.update_from(&[controller]);
    assert_eq!(states.value(0), 0.0);
}

/// it should clamp or wrap values into the controller range
#[test]
fn controller_clamps_or_wraps() {
    let mut clamped = Controller::new("c").with_range(-1.0, 1.0);
    clamped.set_value(3.0);
    approx(clamped.current, 1.0, 0.0);
    approx(clamped.normalized(), 1.0, 0.0);

    let mut wrapped = Controller {
        clamp: false,
        ..Controller::new("w").with_range(0.0, 360.0)
    };
    wrapped.set_value(370.0);
    approx(wrapped.current, 10.0, 1e-4);
}

/// it should multiply bound links and fall back to the default when none is bound
#[test]
fn controller_target_multiplies_bound_links() {
    let links = vec![
        Link::new(&LinkDef::controller(0), &[Some(0), Some(1)]),
        Link::new(&LinkDef::controller(1), &[Some(0), Some(1)]),
        Link::new(&LinkDef::default(), &[]),
    ];
    let mut states = ControllerStates::new();
    states.push(0.5, Vec3::new(0.0, 0.0, 1.0));
    states.push(0.4, Vec3::ZERO);

    let both = ControllerTarget::new(vec![0, 1]);
    approx(both.value(&links, &states, 1.0), 0.2, 1e-6);
    let unbound = ControllerTarget::new(vec![2]);
    approx(unbound.value(&links, &states, 0.7), 0.7, 0.0);
    assert_eq!(
        ControllerTarget::new(vec![0]).vector(&links, &states, Vec3::ONE),
        Vec3::new(0.0, 0.0, 1.0)
    );
}

/// it should drive a link from a bone rotation mapped into [0,1]
#[test]
fn bone_driven_link_reads_pose() {
    let rig = arm_rig();
    let mut bones = BoneStateList::new();
    bones.rebuild(&rig, &[], false).unwrap();
    let elbow = bones.index_of("elbow").unwrap();
    bones.blend_pose(
        elbow,
        &Pose::new(Vec3::ZERO, Quat::from_rotation_z(0.5), Vec3::ONE),
        BlendMode::Blend,
        1.0,
        ChannelMask::ALL,
    );

    let def = LinkDef {
        bone: Some("elbow".into()),
        bone_parameter: BoneParameter::RotationZ,
        bone_minimum: 0.0,
        bone_maximum: 1.0,
        ..LinkDef::default()
    };
    let mut link = Link::new(&def, &[]);
    link.resolve_bone(&bones);
    link.update_bone_value(&bones);
    approx(link.evaluate(&ControllerStates::new(), 0.0), 0.5, 1e-5);
}

/// it should evaluate linear and constant curves between their points
#[test]
fn curves_interpolate() {
    let linear = Curve::linear(vec![CurvePoint::new(0.0, 1.0), CurvePoint::new(1.0, 0.0)]);
    approx(linear.evaluate(0.25), 0.75, 1e-6);
    approx(linear.evaluate(-1.0), 1.0, 0.0);

    let constant = Curve {
        interpolation: CurveInterpolation::Constant,
        ..linear.clone()
    };
    approx(constant.evaluate(0.9), 1.0, 0.0);
    approx(Curve::default().evaluate(0.3), 0.3, 0.0);
}

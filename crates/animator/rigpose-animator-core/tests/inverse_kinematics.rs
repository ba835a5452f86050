use std::sync::Arc;

use glam::{Quat, Vec3};
use rigpose_animator_core::{
    blend::{BlendMode, Pose},
    component::{lock_component, Component, SharedComponent},
    config::{Config, IkConfig},
    descriptor::Animator,
    ik::{self, IkChain, IkGoal, IkSolverKind, SolveStatus},
    rig::{BoneIkLimits, Rig, RigBone},
    state::BoneStateList,
    AnimatorInstance,
};

fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

fn arm_rig() -> Rig {
    let mut rig: Rig = rigpose_test_fixtures::rigs::load("arm").unwrap();
    rig.reindex();
    rig
}

fn arm_bones() -> BoneStateList {
    let mut bones = BoneStateList::new();
    bones.rebuild(&arm_rig(), &[], false).unwrap();
    bones
}

fn solve_arm(goal: Vec3, kind: IkSolverKind) -> (BoneStateList, ik::SolveReport) {
    let mut bones = arm_bones();
    let root = bones.index_of("root").unwrap();
    let wrist = bones.index_of("wrist").unwrap();
    let config = IkConfig::default();
    let mut chain = IkChain::between(&bones, root, wrist).unwrap();
    assert_eq!(chain.len(), 4);
    chain.capture(&mut bones, config.min_link_weight);
    let report = ik::solve(&mut chain, &IkGoal::at(goal), kind, &config);
    chain.write_back(&mut bones, BlendMode::Blend, 1.0);
    (bones, report)
}

fn wrist_position(bones: &mut BoneStateList) -> Vec3 {
    let wrist = bones.index_of("wrist").unwrap();
    bones.global_matrix(wrist).w_axis.truncate()
}

/// it should bring the wrist within tolerance of a reachable goal with FABRIK
#[test]
fn fabrik_reaches_goal() {
    let goal = Vec3::new(2.9, 0.0, 0.0);
    let (mut bones, report) = solve_arm(goal, IkSolverKind::Fabrik);
    assert_eq!(report.status, SolveStatus::Reached);
    assert!(report.iterations <= IkConfig::default().max_iterations);
    let distance = wrist_position(&mut bones).distance(goal);
    assert!(distance < 1e-3 + 1e-4, "distance {distance}");
}

/// it should keep segment lengths while solving
#[test]
fn fabrik_preserves_bone_lengths() {
    let (mut bones, _) = solve_arm(Vec3::new(2.9, 0.0, 0.0), IkSolverKind::Fabrik);
    let positions: Vec<Vec3> = ["root", "shoulder", "elbow", "wrist"]
        .iter()
        .map(|name| {
            let index = bones.index_of(name).unwrap();
            bones.global_matrix(index).w_axis.truncate()
        })
        .collect();
    for pair in positions.windows(2) {
        approx(pair[0].distance(pair[1]), 1.0, 1e-3);
    }
}

/// it should converge with CCD as well, more loosely
#[test]
fn ccd_reaches_goal() {
    let goal = Vec3::new(2.9, 0.0, 0.0);
    let (mut bones, report) = solve_arm(goal, IkSolverKind::Ccd);
    assert!(report.iterations <= IkConfig::default().ccd_max_iterations);
    let distance = wrist_position(&mut bones).distance(goal);
    assert!(distance < 0.01, "distance {distance}");
}

/// it should stretch toward an unreachable goal and terminate
#[test]
fn unreachable_goal_extends_chain() {
    let goal = Vec3::new(10.0, 0.0, 0.0);
    let (mut bones, report) = solve_arm(goal, IkSolverKind::Fabrik);
    assert_eq!(report.status, SolveStatus::Unreachable);
    let wrist = wrist_position(&mut bones);
    assert!((wrist - Vec3::new(3.0, 0.0, 0.0)).length() < 1e-3, "{wrist:?}");
}

/// it should never move a bone whose axes are all locked
#[test]
fn locked_bone_keeps_its_rotation() {
    let rig = Rig::new(vec![
        RigBone::new("base", None, Vec3::ZERO),
        RigBone {
            ik_limits: BoneIkLimits {
                locked: [true, true, true],
                ..BoneIkLimits::default()
            },
            ..RigBone::new("stiff", Some(0), Vec3::X)
        },
        RigBone::new("tip", Some(1), Vec3::X),
    ]);
    let mut bones = BoneStateList::new();
    bones.rebuild(&rig, &[], false).unwrap();
    let config = IkConfig::default();
    let mut chain = IkChain::between(&bones, 0, 2).unwrap();
    chain.capture(&mut bones, config.min_link_weight);
    ik::solve(
        &mut chain,
        &IkGoal::at(Vec3::new(1.0, 1.0, 0.0)),
        IkSolverKind::Ccd,
        &config,
    );
    chain.write_back(&mut bones, BlendMode::Blend, 1.0);
    approx(bones.pose(1).orientation.angle_between(Quat::IDENTITY), 0.0, 1e-4);
}

fn arm_component() -> SharedComponent {
    Component::new(Arc::new(arm_rig())).shared()
}

/// it should solve the arm through an animator instance and write the result back
#[test]
fn instance_applies_ik_rule() {
    let json = rigpose_test_fixtures::animators::json("arm-ik").unwrap();
    let animator = Arc::new(Animator::from_json(&json).unwrap());
    let component = arm_component();

    let mut instance = AnimatorInstance::new(Config::default());
    instance.set_animator(Some(animator));
    instance.set_component(Some(component.clone()));
    instance.apply(true).unwrap();

    let component = lock_component(&component);
    let wrist = component.bone_component_matrix(3).w_axis.truncate();
    assert!(
        wrist.distance(Vec3::new(2.9, 0.0, 0.0)) < 1e-3 + 1e-4,
        "{wrist:?}"
    );
}

/// it should leave the component untouched when the blend factor controller is zero
#[test]
fn zero_blend_factor_skips_ik() {
    let json = rigpose_test_fixtures::animators::json("arm-ik").unwrap();
    let animator = Arc::new(Animator::from_json(&json).unwrap());
    let component = arm_component();

    let mut instance = AnimatorInstance::new(Config::default());
    instance.set_animator(Some(animator));
    instance.set_component(Some(component.clone()));
    let reach = instance.controller_index("reach").unwrap();
    instance.controllers_mut()[reach].set_value(0.0);
    instance.apply(true).unwrap();

    let component = lock_component(&component);
    let wrist = component.bone_component_matrix(3).w_axis.truncate();
    assert!((wrist - Vec3::new(2.0, 1.0, 0.0)).length() < 1e-5);
}

/// it should place a single bone directly on the goal
#[test]
fn single_bone_is_placed_on_goal() {
    let json = r#"{
        "rules": [
            { "type": "inverseKinematic", "bones": ["wrist"], "goalPosition": [0.5, 0.5, 0.0] }
        ]
    }"#;
    let animator = Arc::new(Animator::from_json(json).unwrap());
    let component = arm_component();
    let mut instance = AnimatorInstance::new(Config::default());
    instance.set_animator(Some(animator));
    instance.set_component(Some(component.clone()));
    instance.apply(true).unwrap();

    let component = lock_component(&component);
    let wrist = component.bone_component_matrix(3).w_axis.truncate();
    assert!((wrist - Vec3::new(0.5, 0.5, 0.0)).length() < 1e-4, "{wrist:?}");
}

fn instance_on(json: &str, component: &SharedComponent) -> AnimatorInstance {
    let animator = Arc::new(Animator::from_json(json).unwrap());
    let mut instance = AnimatorInstance::new(Config::default());
    instance.set_animator(Some(animator));
    instance.set_component(Some(component.clone()));
    instance
}

/// it should land a bent arm on the goal in overlay mode instead of adding the solve twice
#[test]
fn overlay_chain_reaches_goal_from_bent_pose() {
    let json = r#"{
        "rules": [
            {
                "type": "inverseKinematic",
                "blendMode": "overlay",
                "bones": ["root", "wrist"],
                "goalPosition": [2.9, 0.0, 0.0]
            }
        ]
    }"#;
    let component = arm_component();
    lock_component(&component).set_bone(
        2,
        Pose::new(Vec3::ZERO, Quat::from_rotation_z(0.3), Vec3::ONE),
    );
    let mut instance = instance_on(json, &component);
    instance.apply(true).unwrap();

    let component = lock_component(&component);
    let wrist = component.bone_component_matrix(3).w_axis.truncate();
    assert!(
        wrist.distance(Vec3::new(2.9, 0.0, 0.0)) < 2e-3,
        "{wrist:?}"
    );
}

/// it should place a displaced single bone on the goal in overlay mode
#[test]
fn overlay_single_bone_lands_on_goal() {
    let json = r#"{
        "rules": [
            {
                "type": "inverseKinematic",
                "blendMode": "overlay",
                "bones": ["wrist"],
                "goalPosition": [0.5, 0.5, 0.0]
            }
        ]
    }"#;
    let component = arm_component();
    {
        let mut component = lock_component(&component);
        component.set_bone(2, Pose::new(Vec3::ZERO, Quat::from_rotation_z(0.3), Vec3::ONE));
        component.set_bone(3, Pose::new(Vec3::new(0.3, 0.2, 0.0), Quat::IDENTITY, Vec3::ONE));
    }
    let mut instance = instance_on(json, &component);
    instance.apply(true).unwrap();

    let component = lock_component(&component);
    let wrist = component.bone_component_matrix(3).w_axis.truncate();
    assert!((wrist - Vec3::new(0.5, 0.5, 0.0)).length() < 1e-4, "{wrist:?}");
}

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use rigpose_animator_core::{
    animation::{Animation, AnimationTracks},
    component::{Component, SharedComponent},
    config::Config,
    descriptor::Animator,
    rig::{Model, Rig},
    AnimatorInstance,
};

fn arm_component() -> SharedComponent {
    let mut rig: Rig = rigpose_test_fixtures::rigs::load("arm").expect("arm rig");
    rig.reindex();
    let model: Option<Model> = rigpose_test_fixtures::rigs::model("arm").expect("arm model");
    let mut component = Component::new(Arc::new(rig));
    if let Some(model) = model {
        component = component.with_model(Arc::new(model));
    }
    component.shared()
}

fn instance(animator: &str, animation: Option<Arc<AnimationTracks>>) -> AnimatorInstance {
    let json = rigpose_test_fixtures::animators::json(animator).expect("animator fixture");
    let animator = Animator::from_json(&json).expect("animator parses");
    let mut instance = AnimatorInstance::new(Config::default());
    instance.set_animator(Some(Arc::new(animator)));
    instance.set_animation(animation);
    instance.set_component(Some(arm_component()));
    instance
}

fn apply_rules(c: &mut Criterion) {
    let source: Animation = rigpose_test_fixtures::animations::load("wave").expect("wave");
    let tracks = Arc::new(AnimationTracks::build(&source).expect("tracks"));

    let mut wave = instance("wave", Some(tracks));
    let time = wave.controller_index("time").expect("time controller");
    let mut t = 0.0_f32;
    c.bench_function("wave_frame", |b| {
        b.iter(|| {
            t = (t + 0.01) % 1.0;
            wave.controllers_mut()[time].set_value(black_box(t));
            wave.apply(true).expect("apply");
        })
    });

    let mut ik = instance("arm-ik", None);
    c.bench_function("arm_ik_frame", |b| {
        b.iter(|| {
            ik.apply(true).expect("apply");
        })
    });

    let mut limit = instance("elbow-limit", None);
    let bend = limit.controller_index("bend").expect("bend controller");
    c.bench_function("limit_frame", |b| {
        b.iter(|| {
            limit.controllers_mut()[bend].set_value(black_box(1.5));
            limit.apply(true).expect("apply");
        })
    });
}

criterion_group!(benches, apply_rules);
criterion_main!(benches);

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rigpose_animator_core::{
    component::{lock_component, Component, SharedComponent},
    config::Config,
    descriptor::Animator,
    diagnostics::{Phase, PhaseObserver},
    math::quat_to_euler,
    rig::Rig,
    task::{run_task, TaskHandle, TaskScheduler, TaskStatus, ThreadScheduler, Work},
    AnimatorInstance,
};

fn approx(a: f32, b: f32, eps: f32) {
    assert!((a - b).abs() <= eps, "left={a} right={b} eps={eps}");
}

const ELBOW: usize = 2;

/// Queues work until someone waits, so tests decide when tasks run.
#[derive(Default)]
struct DeferredScheduler {
    pending: Mutex<Vec<(TaskHandle, Work)>>,
}

impl DeferredScheduler {
    fn run_pending(&self) {
        let pending: Vec<_> = self.pending.lock().unwrap().drain(..).collect();
        for (handle, work) in pending {
            run_task(&handle, work);
        }
    }

    fn queued(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

impl TaskScheduler for DeferredScheduler {
    // dependencies were submitted earlier and run first
    fn submit(&self, work: Work, _dependencies: &[TaskHandle]) -> TaskHandle {
        let handle = TaskHandle::new();
        self.pending.lock().unwrap().push((handle.clone(), work));
        handle
    }

    fn wait(&self, handle: &TaskHandle) {
        if !handle.is_finished() {
            self.run_pending();
        }
        handle.wait();
    }
}

/// Cancels the watched task as soon as its rules have run.
#[derive(Default)]
struct CancelAfterRules {
    handle: Mutex<Option<TaskHandle>>,
}

impl PhaseObserver for CancelAfterRules {
    fn phase_finished(&self, phase: Phase, _elapsed: Duration) {
        if phase == Phase::ApplyRules {
            if let Some(handle) = self.handle.lock().unwrap().as_ref() {
                handle.cancel();
            }
        }
    }
}

fn parallel_config() -> Config {
    let mut config = Config::default();
    config.use_parallel_task = true;
    config
}

fn arm_component() -> SharedComponent {
    let mut rig: Rig = rigpose_test_fixtures::rigs::load("arm").unwrap();
    rig.reindex();
    Component::new(Arc::new(rig)).shared()
}

fn elbow_animator(mode: &str, z: f32) -> Arc<Animator> {
    let json = format!(
        r#"{{
            "rules": [
                {{
                    "type": "stateManipulator",
                    "blendMode": "{mode}",
                    "bones": ["elbow"],
                    "minimumRotation": [0.0, 0.0, {z}]
                }}
            ]
        }}"#
    );
    Arc::new(Animator::from_json(&json).unwrap())
}

fn elbow_z(component: &SharedComponent) -> f32 {
    quat_to_euler(lock_component(component).bone(ELBOW).orientation).z
}

fn instance_on(
    scheduler: Arc<dyn TaskScheduler>,
    config: Config,
    animator: Arc<Animator>,
    component: &SharedComponent,
) -> AnimatorInstance {
    let mut instance = AnimatorInstance::with_scheduler(config, scheduler);
    instance.set_animator(Some(animator));
    instance.set_component(Some(component.clone()));
    instance
}

/// it should lend the pipeline to the task and take it back once the task finished
#[test]
fn pipeline_returns_after_task() {
    let scheduler = Arc::new(DeferredScheduler::default());
    let component = arm_component();
    let mut instance = instance_on(
        scheduler.clone(),
        parallel_config(),
        elbow_animator("blend", 0.5),
        &component,
    );

    instance.apply(false).unwrap();
    assert_eq!(scheduler.queued(), 1);
    assert!(instance.rule_set().is_none());
    let handle = instance.task().cloned().expect("task in flight");
    assert_eq!(lock_component(&component).animator_task(), Some(handle.clone()));

    instance.wait_task_finished().unwrap();
    assert_eq!(handle.status(), TaskStatus::Finished);
    assert!(instance.task().is_none());
    assert!(instance.rule_set().is_some());
    approx(elbow_z(&component), 0.5, 1e-4);
    assert!(lock_component(&component).animator_task().is_none());
}

/// it should never write the component when cancelled after the rules ran
#[test]
fn cancel_mid_run_skips_write_back() {
    let scheduler = Arc::new(DeferredScheduler::default());
    let observer = Arc::new(CancelAfterRules::default());
    let mut config = parallel_config();
    config.diagnostics.enabled = true;
    let component = arm_component();
    let mut instance = AnimatorInstance::with_scheduler(config, scheduler.clone())
        .with_observer(observer.clone());
    instance.set_animator(Some(elbow_animator("blend", 0.5)));
    instance.set_component(Some(component.clone()));

    instance.apply(false).unwrap();
    let handle = instance.task().cloned().expect("task in flight");
    *observer.handle.lock().unwrap() = Some(handle.clone());
    scheduler.run_pending();

    assert_eq!(handle.status(), TaskStatus::Cancelled);
    approx(elbow_z(&component), 0.0, 1e-6);
    assert!(lock_component(&component).animator_task().is_none());
    // the pipeline still comes back and the next pass works
    instance.wait_task_finished().unwrap();
    assert!(instance.rule_set().is_some());
    *observer.handle.lock().unwrap() = None;
    instance.apply(true).unwrap();
    approx(elbow_z(&component), 0.5, 1e-4);
}

/// it should drop work cancelled before it started and still reclaim the pipeline
#[test]
fn cancel_before_start_drops_work() {
    let scheduler = Arc::new(DeferredScheduler::default());
    let component = arm_component();
    let mut instance = instance_on(
        scheduler.clone(),
        parallel_config(),
        elbow_animator("blend", 0.5),
        &component,
    );
    instance.apply(false).unwrap();
    let handle = instance.task().cloned().expect("task in flight");

    instance.cancel_task();
    assert_eq!(handle.status(), TaskStatus::Cancelled);
    assert!(instance.task().is_none());
    assert!(instance.rule_set().is_some());
    approx(elbow_z(&component), 0.0, 1e-6);
    assert!(lock_component(&component).animator_task().is_none());
}

/// it should chain two instances on one component so the second sees the first's output
#[test]
fn chained_instances_compose() {
    let scheduler = Arc::new(DeferredScheduler::default());
    let component = arm_component();
    let mut first = instance_on(
        scheduler.clone(),
        parallel_config(),
        elbow_animator("blend", 0.5),
        &component,
    );
    let mut second = instance_on(
        scheduler.clone(),
        parallel_config(),
        elbow_animator("overlay", 0.25),
        &component,
    );

    first.apply(false).unwrap();
    second.apply(false).unwrap();
    let second_handle = second.task().cloned().expect("second task");
    assert_eq!(
        lock_component(&component).animator_task(),
        Some(second_handle)
    );

    scheduler.run_pending();
    approx(elbow_z(&component), 0.75, 1e-4);
    assert!(lock_component(&component).animator_task().is_none());
    first.wait_task_finished().unwrap();
    second.wait_task_finished().unwrap();
}

/// it should wait for another instance's task before running a direct pass
#[test]
fn direct_pass_waits_for_pending_writer() {
    let scheduler = Arc::new(DeferredScheduler::default());
    let component = arm_component();
    let mut first = instance_on(
        scheduler.clone(),
        parallel_config(),
        elbow_animator("blend", 0.5),
        &component,
    );
    let mut second = instance_on(
        scheduler.clone(),
        Config::default(),
        elbow_animator("overlay", 0.25),
        &component,
    );

    first.apply(false).unwrap();
    second.apply(true).unwrap();
    assert_eq!(scheduler.queued(), 0);
    approx(elbow_z(&component), 0.75, 1e-4);
}

/// it should cancel a pending pass when the instance is dropped
#[test]
fn dropping_instance_cancels_task() {
    let scheduler = Arc::new(DeferredScheduler::default());
    let component = arm_component();
    let mut instance = instance_on(
        scheduler.clone(),
        parallel_config(),
        elbow_animator("blend", 0.5),
        &component,
    );
    instance.apply(false).unwrap();
    let handle = instance.task().cloned().expect("task in flight");
    drop(instance);

    assert_eq!(handle.status(), TaskStatus::Cancelled);
    approx(elbow_z(&component), 0.0, 1e-6);
    assert!(lock_component(&component).animator_task().is_none());
}

/// it should run passes on worker threads and apply them frame after frame
#[test]
fn thread_scheduler_applies_frames() {
    let component = arm_component();
    let mut instance = instance_on(
        Arc::new(ThreadScheduler::default()),
        parallel_config(),
        elbow_animator("overlay", 0.1),
        &component,
    );
    for _ in 0..5 {
        instance.apply(false).unwrap();
    }
    instance.wait_task_finished().unwrap();
    approx(elbow_z(&component), 0.5, 1e-4);
    assert!(lock_component(&component).animator_task().is_none());
}

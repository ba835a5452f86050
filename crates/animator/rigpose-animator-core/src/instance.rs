//! `AnimatorInstance`: one animator applied to one component.
//!
//! Per frame the instance prepares its pipeline on the caller (rebuilds, controller states) and
//! then runs the rule pass either directly or as a task. A pass reads the component, runs the
//! rules, checks for cancellation and only then writes back. While a task runs it owns the
//! pipeline; the pipeline comes back through a channel when the task finishes or is dropped.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use crate::animation::AnimationTracks;
use crate::blend::BlendMode;
use crate::component::{lock_component, SharedComponent};
use crate::config::Config;
use crate::controller::{Controller, ControllerStates};
use crate::descriptor::Animator;
use crate::diagnostics::{Phase, PhaseObserver, PhaseTimer};
use crate::error::{AnimatorError, Result};
use crate::math::{is_one, is_zero};
use crate::rule::RuleSet;
use crate::state::{BoneStateList, VpsStateList};
use crate::task::{CancelToken, InlineScheduler, TaskHandle, TaskScheduler, TaskStatus};

/// Everything a rule pass mutates. Lent to the task while one is in flight.
#[derive(Debug, Default)]
struct Pipeline {
    bones: BoneStateList,
    vps: VpsStateList,
    rules: Option<RuleSet>,
    controller_states: ControllerStates,
}

/// Sends the pipeline back to the instance however the task ends, including when the scheduler
/// drops the work unrun.
struct PipelineLease {
    pipeline: Option<Pipeline>,
    sender: Sender<Pipeline>,
}

impl Drop for PipelineLease {
    fn drop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            // the instance may be gone already
            let _ = self.sender.send(pipeline);
        }
    }
}

struct PendingTask {
    handle: TaskHandle,
    receiver: Receiver<Pipeline>,
}

#[derive(Clone, Copy, Debug)]
struct Dirty {
    mappings: bool,
    rules: bool,
    params: bool,
}

impl Dirty {
    const ALL: Dirty = Dirty {
        mappings: true,
        rules: true,
        params: true,
    };
}

/// Inputs of one rule pass that outlive the caller's borrow.
#[derive(Clone)]
struct PassEnv {
    component: SharedComponent,
    config: Config,
    observer: Option<Arc<dyn PhaseObserver>>,
    blend: Option<(BlendMode, f32)>,
}

impl PassEnv {
    fn observer(&self) -> Option<&dyn PhaseObserver> {
        if self.config.diagnostics.enabled {
            self.observer.as_deref()
        } else {
            None
        }
    }

    /// Read the component, run the rules and write back unless cancelled. Returns whether the
    /// component was written.
    fn run(&self, pipeline: &mut Pipeline, token: Option<&CancelToken>) -> bool {
        let Some(rules) = pipeline.rules.as_mut() else {
            return false;
        };
        let component_matrix = {
            let _timer = PhaseTimer::start(self.observer(), Phase::Controllers);
            let component = lock_component(&self.component);
            pipeline.bones.update_from_component(&component);
            pipeline.vps.update_from_component(&component);
            component.matrix()
        };
        {
            let _timer = PhaseTimer::start(self.observer(), Phase::ApplyRules);
            rules.apply(
                &mut pipeline.bones,
                &mut pipeline.vps,
                &pipeline.controller_states,
                &self.config,
                component_matrix,
            );
        }

        let _timer = PhaseTimer::start(self.observer(), Phase::WriteBack);
        let mut component = lock_component(&self.component);
        if let Some(token) = token {
            if token.is_cancelled() {
                log::debug!("task {} cancelled before write-back", token.id());
                component.clear_animator_task_if(token.id());
                return false;
            }
        }
        pipeline
            .bones
            .apply_to_component(&mut component, self.blend);
        pipeline.vps.apply_to_component(&mut component, self.blend);
        if let Some(token) = token {
            component.clear_animator_task_if(token.id());
        }
        true
    }
}

pub struct AnimatorInstance {
    config: Config,
    scheduler: Arc<dyn TaskScheduler>,
    observer: Option<Arc<dyn PhaseObserver>>,
    animator: Option<Arc<Animator>>,
    /// Revision the pipeline was built from; 0 forces a rebuild.
    animator_revision: u64,
    animation: Option<Arc<AnimationTracks>>,
    component: Option<SharedComponent>,
    controllers: Vec<Controller>,
    blend_mode: BlendMode,
    blend_factor: f32,
    use_blending: bool,
    skip_apply: bool,
    dirty: Dirty,
    /// `None` while lent to a task or after a failed build.
    pipeline: Option<Pipeline>,
    task: Option<PendingTask>,
}

impl AnimatorInstance {
    pub fn new(config: Config) -> Self {
        Self::with_scheduler(config, Arc::new(InlineScheduler))
    }

    pub fn with_scheduler(config: Config, scheduler: Arc<dyn TaskScheduler>) -> Self {
        Self {
            config,
            scheduler,
            observer: None,
            animator: None,
            animator_revision: 0,
            animation: None,
            component: None,
            controllers: Vec::new(),
            blend_mode: BlendMode::Blend,
            blend_factor: 1.0,
            use_blending: false,
            skip_apply: false,
            dirty: Dirty::ALL,
            pipeline: Some(Pipeline::default()),
            task: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PhaseObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn animator(&self) -> Option<&Arc<Animator>> {
        self.animator.as_ref()
    }

    pub fn component(&self) -> Option<&SharedComponent> {
        self.component.as_ref()
    }

    pub fn set_animator(&mut self, animator: Option<Arc<Animator>>) {
        self.wait_for_task();
        self.controllers = animator
            .as_ref()
            .map(|a| a.definition().controllers.clone())
            .unwrap_or_default();
        self.animator = animator;
        self.animator_revision = 0;
        self.dirty = Dirty::ALL;
    }

    /// Animation used instead of the animator's own.
    pub fn set_animation(&mut self, animation: Option<Arc<AnimationTracks>>) {
        self.wait_for_task();
        self.animation = animation;
        self.dirty.rules = true;
        self.dirty.params = true;
    }

    pub fn set_component(&mut self, component: Option<SharedComponent>) {
        self.wait_for_task();
        self.component = component;
        self.dirty.mappings = true;
        self.dirty.params = true;
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend_mode = mode;
        self.update_blending();
    }

    pub fn blend_factor(&self) -> f32 {
        self.blend_factor
    }

    pub fn set_blend_factor(&mut self, factor: f32) {
        self.blend_factor = factor.clamp(0.0, 1.0);
        self.update_blending();
    }

    fn update_blending(&mut self) {
        self.skip_apply = is_zero(self.blend_factor);
        self.use_blending = !(self.blend_mode == BlendMode::Blend && is_one(self.blend_factor));
    }

    pub fn set_protect_dynamic_bones(&mut self, protect: bool) {
        if self.config.protect_dynamic_bones != protect {
            self.config.protect_dynamic_bones = protect;
            self.dirty.mappings = true;
            self.dirty.params = true;
        }
    }

    pub fn controllers(&self) -> &[Controller] {
        &self.controllers
    }

    /// Controllers are read by the next `apply`.
    pub fn controllers_mut(&mut self) -> &mut [Controller] {
        &mut self.controllers
    }

    pub fn controller_index(&self, name: &str) -> Option<usize> {
        self.controllers.iter().position(|c| c.name == name)
    }

    pub fn notify_controller_changed(&mut self, index: usize) {
        log::trace!("controller {index} changed");
    }

    /// Rebuild rules on the next pass, e.g. after a nested animator was edited.
    pub fn notify_rules_changed(&mut self) {
        self.dirty.rules = true;
        self.dirty.params = true;
    }

    /// The built rules; `None` before the first pass or while a task runs.
    pub fn rule_set(&self) -> Option<&RuleSet> {
        self.pipeline.as_ref().and_then(|p| p.rules.as_ref())
    }

    pub fn bone_states(&self) -> Option<&BoneStateList> {
        self.pipeline.as_ref().map(|p| &p.bones)
    }

    pub fn vps_states(&self) -> Option<&VpsStateList> {
        self.pipeline.as_ref().map(|p| &p.vps)
    }

    /// Handle of the task in flight, if any.
    pub fn task(&self) -> Option<&TaskHandle> {
        self.task.as_ref().map(|t| &t.handle)
    }

    fn active_observer(&self) -> Option<Arc<dyn PhaseObserver>> {
        self.observer
            .clone()
            .filter(|_| self.config.diagnostics.enabled)
    }

    /// Run one frame. `direct` forces the pass onto the caller even with parallel tasks enabled.
    pub fn apply(&mut self, direct: bool) -> Result<()> {
        self.wait_for_task();
        if self.skip_apply {
            return Ok(());
        }
        let Some(component) = self.component.clone() else {
            return Ok(());
        };
        let mut pipeline = self.take_pipeline();
        if let Err(err) = self.prepare(&mut pipeline) {
            self.discard_pipeline();
            return Err(err);
        }
        if pipeline.rules.is_none() {
            self.pipeline = Some(pipeline);
            return Ok(());
        }

        let env = PassEnv {
            component: component.clone(),
            config: self.config.clone(),
            observer: self.observer.clone(),
            blend: self
                .use_blending
                .then_some((self.blend_mode, self.blend_factor)),
        };

        if direct || !self.config.use_parallel_task {
            let active = lock_component(&component).animator_task();
            if let Some(active) = active {
                self.scheduler.wait(&active);
            }
            env.run(&mut pipeline, None);
            self.pipeline = Some(pipeline);
            return Ok(());
        }

        let dependencies: Vec<TaskHandle> = lock_component(&component)
            .animator_task()
            .into_iter()
            .collect();
        let (sender, receiver) = mpsc::channel();
        let mut lease = PipelineLease {
            pipeline: Some(pipeline),
            sender,
        };
        let handle = self.scheduler.submit(
            Box::new(move |token: &CancelToken| {
                if let Some(pipeline) = lease.pipeline.as_mut() {
                    env.run(pipeline, Some(token));
                }
            }),
            &dependencies,
        );
        {
            let mut component = lock_component(&component);
            if !handle.is_finished() {
                component.set_animator_task(Some(handle.clone()));
            }
        }
        self.task = Some(PendingTask { handle, receiver });
        Ok(())
    }

    /// Block until the task in flight finished and reclaim the pipeline. Reports a failed task.
    pub fn wait_task_finished(&mut self) -> Result<()> {
        match self.wait_for_task() {
            Some((id, TaskStatus::Failed)) => Err(AnimatorError::TaskFailed(id)),
            _ => Ok(()),
        }
    }

    /// Cancel the task in flight and wait for it. The component is left untouched.
    pub fn cancel_task(&mut self) {
        if let Some(task) = &self.task {
            self.scheduler.cancel(&task.handle);
        }
        self.wait_for_task();
    }

    /// Store the component's current state in every snapshot rule with `id`.
    pub fn capture_state_into(&mut self, id: u32) -> Result<()> {
        self.wait_for_task();
        let Some(component) = self.component.clone() else {
            return Ok(());
        };
        let mut pipeline = self.take_pipeline();
        if let Err(err) = self.prepare(&mut pipeline) {
            self.discard_pipeline();
            return Err(err);
        }
        {
            let component = lock_component(&component);
            pipeline.bones.update_from_component(&component);
            pipeline.vps.update_from_component(&component);
        }
        if let Some(rules) = pipeline.rules.as_mut() {
            rules.capture_state(id, &pipeline.bones, &pipeline.vps);
        }
        self.pipeline = Some(pipeline);
        Ok(())
    }

    /// Store `move_name` sampled at `time` in every snapshot rule with `id`.
    pub fn store_frame_into(&mut self, id: u32, move_name: &str, time: f32) -> Result<()> {
        self.wait_for_task();
        if self.component.is_none() {
            return Ok(());
        }
        let mut pipeline = self.take_pipeline();
        if let Err(err) = self.prepare(&mut pipeline) {
            self.discard_pipeline();
            return Err(err);
        }
        let stored = match pipeline.rules.as_mut() {
            Some(rules) => rules.store_frame(id, move_name, time, &pipeline.bones, &pipeline.vps),
            None => Ok(0),
        };
        self.pipeline = Some(pipeline);
        log::trace!("stored frame of '{move_name}' into {:?} snapshot rules", stored);
        stored.map(|_| ())
    }

    fn take_pipeline(&mut self) -> Pipeline {
        match self.pipeline.take() {
            Some(pipeline) => pipeline,
            None => {
                self.dirty = Dirty::ALL;
                Pipeline::default()
            }
        }
    }

    fn discard_pipeline(&mut self) {
        self.pipeline = None;
        self.dirty = Dirty::ALL;
    }

    /// Wait for the task in flight and take the pipeline back.
    fn wait_for_task(&mut self) -> Option<(u64, TaskStatus)> {
        let task = self.task.take()?;
        self.scheduler.wait(&task.handle);
        let status = task.handle.status();
        match task.receiver.recv() {
            Ok(pipeline) if status != TaskStatus::Failed => self.pipeline = Some(pipeline),
            _ => {
                log::warn!("task {} ended {:?}, rebuilding pipeline", task.handle.id(), status);
                self.discard_pipeline();
            }
        }
        if status == TaskStatus::Failed {
            log::error!("rule evaluation task {} failed", task.handle.id());
        }
        Some((task.handle.id(), status))
    }

    /// Bring mappings, rules, parameters and controller states up to date.
    fn prepare(&mut self, pipeline: &mut Pipeline) -> Result<()> {
        let observer = self.active_observer();
        let observer = observer.as_deref();
        let _prepare = PhaseTimer::start(observer, Phase::Prepare);
        let (Some(animator), Some(component)) = (self.animator.clone(), self.component.clone())
        else {
            pipeline.rules = None;
            return Ok(());
        };

        let (def, revision) = animator.snapshot();
        if revision != self.animator_revision {
            if self.animator_revision != 0 {
                reseed_controllers(&mut self.controllers, &def.controllers);
            }
            self.dirty = Dirty::ALL;
        }
        if pipeline.rules.as_ref().is_some_and(RuleSet::needs_rebuild) {
            self.dirty.rules = true;
            self.dirty.params = true;
        }

        if self.dirty.mappings {
            let _timer = PhaseTimer::start(observer, Phase::Mappings);
            let component = lock_component(&component);
            match component.rig() {
                Some(rig) => {
                    pipeline
                        .bones
                        .rebuild(rig, &def.bones, self.config.protect_dynamic_bones)?
                }
                None => pipeline.bones = BoneStateList::new(),
            }
            pipeline
                .vps
                .rebuild(component.model().map(|m| m.as_ref()), &def.vertex_position_sets)?;
            self.dirty.mappings = false;
            self.dirty.params = true;
        }

        if self.dirty.rules || self.dirty.params {
            let _timer = PhaseTimer::start(observer, Phase::Rules);
            if self.dirty.rules {
                let animation = self.animation.clone().or_else(|| def.animation.clone());
                let identity: Vec<Option<usize>> = (0..def.controllers.len()).map(Some).collect();
                pipeline.rules = Some(RuleSet::build(def.clone(), revision, animation, &identity)?);
                self.dirty.rules = false;
                self.dirty.params = true;
            }
            if let Some(rules) = pipeline.rules.as_mut() {
                rules.update_parameters(&pipeline.bones, &pipeline.vps)?;
            }
            self.dirty.params = false;
        }
        self.animator_revision = revision;

        pipeline.controller_states.update_from(&self.controllers);
        Ok(())
    }
}

/// Take the animator's controller list, keeping values of controllers that survived.
fn reseed_controllers(controllers: &mut Vec<Controller>, seed: &[Controller]) {
    let previous = std::mem::take(controllers);
    *controllers = seed
        .iter()
        .map(|c| {
            let mut controller = c.clone();
            if let Some(old) = previous.iter().find(|o| o.name == c.name) {
                controller.set_value(old.current);
                controller.set_vector(old.vector);
            }
            controller
        })
        .collect();
}

impl Drop for AnimatorInstance {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            self.scheduler.cancel(&task.handle);
            self.scheduler.wait(&task.handle);
        }
    }
}

impl std::fmt::Debug for AnimatorInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimatorInstance")
            .field("animator_revision", &self.animator_revision)
            .field("controllers", &self.controllers)
            .field("blend_mode", &self.blend_mode)
            .field("blend_factor", &self.blend_factor)
            .field("task", &self.task.as_ref().map(|t| t.handle.id()))
            .finish_non_exhaustive()
    }
}

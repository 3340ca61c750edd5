//=========================================================================
// Scene Transition Coordinator
//=========================================================================
//
// Runs one scene transition at a time as a cooperative task.
//
// Phases:
//   Idle
//    │ load_scene(request)
//    ▼
//   PreLoad ............ transition scene, PreLoad(scene), begin_load
//    ▼
//   PreLoadAsyncGate ... PreLoadAsync(scene), wait for PreLoad readiness
//    ▼
//   Activation ......... Progress(..), allow activation at 0.9, wait done
//    ▼
//   AfterLoad .......... AfterLoad(scene)
//    ▼
//   AfterLoadAsyncGate . AfterLoadAsync(scene), wait for AfterLoad readiness
//    ▼
//   Settling ........... Progress(1.0), react delay
//    ▼
//   Idle ............... LoadComplete(scene)
//
// Gates are checked on entry and then once per tick. A gate with no
// predicates opens at once. There is no timeout; a predicate that never
// turns true stalls the transition.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use log::{debug, error, info, warn};

//=== Internal Dependencies ===============================================

use super::backend::{SharedBackend, ACTIVATION_THRESHOLD};
use super::readiness::{all_ready, ReadinessPhase, ReadinessSet, StallWatch};
use crate::core::error::SceneError;
use crate::core::event::{Observers, SubscriberId};
use crate::core::task::{Scheduler, Step, Task, TaskContext};
use crate::core::wait::Predicate;

//=== LoadRequest =========================================================

/// A request to switch to another scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub scene: String,

    /// Extra time after the load before the scene counts as interactive.
    pub react_delay: Duration,

    /// Scene shown synchronously while the target loads.
    pub transition_scene: Option<String>,
}

impl LoadRequest {
    pub fn new(scene: impl Into<String>) -> Self {
        Self {
            scene: scene.into(),
            react_delay: Duration::ZERO,
            transition_scene: None,
        }
    }

    pub fn with_react_delay(mut self, delay: Duration) -> Self {
        self.react_delay = delay;
        self
    }

    pub fn with_transition_scene(mut self, scene: impl Into<String>) -> Self {
        self.transition_scene = Some(scene.into());
        self
    }
}

impl From<&str> for LoadRequest {
    fn from(scene: &str) -> Self {
        Self::new(scene)
    }
}

//=== TransitionPhase =====================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionPhase {
    Idle,
    PreLoad,
    PreLoadAsyncGate,
    Activation,
    AfterLoad,
    AfterLoadAsyncGate,
    Settling,
}

impl fmt::Display for TransitionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

//=== TransitionEvent =====================================================

/// Broadcast to observers as a transition runs.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionEvent {
    /// About to load; start synchronous preparation now.
    PreLoad(String),

    /// Start asynchronous preparation; the PreLoad gate follows.
    PreLoadAsync(String),

    /// The scene is live; react synchronously.
    AfterLoad(String),

    /// React asynchronously; the AfterLoad gate follows.
    AfterLoadAsync(String),

    /// Load progress in `[0, 1]`, non-decreasing within one transition.
    Progress(f32),

    /// The scene is interactive and the coordinator is idle again.
    LoadComplete(String),
}

//=== CoordinatorInner ====================================================

struct CoordinatorState {
    phase: TransitionPhase,
    target: Option<String>,
    progress: f32,
}

struct CoordinatorInner {
    scheduler: Rc<Scheduler>,
    backend: SharedBackend,
    events: Observers<TransitionEvent>,
    pre_load: RefCell<ReadinessSet>,
    after_load: RefCell<ReadinessSet>,
    state: RefCell<CoordinatorState>,
    stall_warning_ticks: Cell<Option<u32>>,
    stall_warnings: Cell<u32>,
}

impl CoordinatorInner {
    fn readiness(&self, phase: ReadinessPhase) -> &RefCell<ReadinessSet> {
        match phase {
            ReadinessPhase::PreLoad => &self.pre_load,
            ReadinessPhase::AfterLoad => &self.after_load,
        }
    }

    fn gate_open(&self, phase: ReadinessPhase) -> bool {
        let predicates = self.readiness(phase).borrow().snapshot();
        all_ready(&predicates)
    }

    fn enter(&self, phase: TransitionPhase) {
        debug!("Transition phase {}", phase);
        self.state.borrow_mut().phase = phase;
    }

    fn emit(&self, event: TransitionEvent) {
        self.events.emit(&event);
    }

    /// Emits progress clamped to `[0, 1]` and to the last reported value.
    fn report_progress(&self, progress: f32) {
        let progress = {
            let mut state = self.state.borrow_mut();
            state.progress = progress.clamp(0.0, 1.0).max(state.progress);
            state.progress
        };
        self.emit(TransitionEvent::Progress(progress));
    }

    fn reset_progress(&self) {
        self.state.borrow_mut().progress = 0.0;
        self.emit(TransitionEvent::Progress(0.0));
    }
}

//=== SceneCoordinator ====================================================

/// Phase machine for scene transitions.
///
/// Cheap to clone; clones drive the same coordinator.
#[derive(Clone)]
pub struct SceneCoordinator {
    inner: Rc<CoordinatorInner>,
}

impl SceneCoordinator {
    pub fn new(scheduler: Rc<Scheduler>, backend: SharedBackend) -> Self {
        Self {
            inner: Rc::new(CoordinatorInner {
                scheduler,
                backend,
                events: Observers::new(),
                pre_load: RefCell::new(ReadinessSet::default()),
                after_load: RefCell::new(ReadinessSet::default()),
                state: RefCell::new(CoordinatorState {
                    phase: TransitionPhase::Idle,
                    target: None,
                    progress: 1.0,
                }),
                stall_warning_ticks: Cell::new(None),
                stall_warnings: Cell::new(0),
            }),
        }
    }

    /// Logs one warning when a gate stays closed for `ticks` ticks.
    pub fn set_stall_warning_ticks(&self, ticks: Option<u32>) {
        self.inner.stall_warning_ticks.set(ticks);
    }

    /// Stall warnings logged since creation.
    pub fn stall_warnings(&self) -> u32 {
        self.inner.stall_warnings.get()
    }

    //--- Transitions ------------------------------------------------------

    /// Starts a transition. The PreLoad broadcast happens on the next tick.
    ///
    /// Rejected while another transition is running; the running one is
    /// not affected.
    pub fn load_scene(&self, request: impl Into<LoadRequest>) -> Result<(), SceneError> {
        let request = request.into();

        {
            let mut state = self.inner.state.borrow_mut();
            if let Some(current) = &state.target {
                let err = SceneError::TransitionInProgress {
                    requested: request.scene.clone(),
                    current: current.clone(),
                };
                error!("{}", err);
                return Err(err);
            }
            state.target = Some(request.scene.clone());
            state.phase = TransitionPhase::PreLoad;
        }

        info!("Loading scene {}", request.scene);
        self.inner.scheduler.spawn(Transition {
            inner: Rc::clone(&self.inner),
            request,
            stage: Stage::Start,
            allowed: false,
        });
        Ok(())
    }

    //--- Readiness --------------------------------------------------------

    /// Adds a predicate to a gate. Returns false if this exact `Rc` is
    /// already registered there.
    ///
    /// The caller owns the registration: a predicate left registered keeps
    /// gating every later transition.
    pub fn register_readiness(&self, phase: ReadinessPhase, predicate: Predicate) -> bool {
        self.inner.readiness(phase).borrow_mut().insert(predicate)
    }

    /// Removes a predicate by identity. Returns false if it was not registered.
    pub fn unregister_readiness(&self, phase: ReadinessPhase, predicate: &Predicate) -> bool {
        self.inner.readiness(phase).borrow_mut().remove(predicate)
    }

    pub fn readiness_count(&self, phase: ReadinessPhase) -> usize {
        self.inner.readiness(phase).borrow().len()
    }

    //--- Observers --------------------------------------------------------

    /// Adds an observer, called after all earlier ones.
    pub fn subscribe<F>(&self, observer: F) -> SubscriberId
    where
        F: FnMut(&TransitionEvent) + 'static,
    {
        self.inner.events.subscribe(observer)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Receives every event on a channel, for consumers on other threads.
    pub fn subscribe_channel(&self) -> Receiver<TransitionEvent> {
        self.inner.events.subscribe_channel()
    }

    //--- Queries ----------------------------------------------------------

    pub fn phase(&self) -> TransitionPhase {
        self.inner.state.borrow().phase
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().target.is_some()
    }

    /// Scene being loaded, if any.
    pub fn target(&self) -> Option<String> {
        self.inner.state.borrow().target.clone()
    }

    /// Last reported progress; 1.0 while idle.
    pub fn progress(&self) -> f32 {
        self.inner.state.borrow().progress
    }

    pub fn active_scene(&self) -> String {
        self.inner.backend.borrow().active_scene()
    }
}

//=== Transition Task =====================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Start,
    PreLoadGate,
    Activation,
    AfterLoad,
    AfterLoadGate,
    Settle,
    Finish,
}

struct Transition {
    inner: Rc<CoordinatorInner>,
    request: LoadRequest,
    stage: Stage,
    allowed: bool,
}

impl Transition {
    /// Predicate for an `until` wait on a gate, with stall diagnostics.
    fn gate(&self, phase: ReadinessPhase) -> Predicate {
        let inner = Rc::clone(&self.inner);
        let scene = self.request.scene.clone();
        let watch = RefCell::new(StallWatch::default());

        Rc::new(move || {
            if inner.gate_open(phase) {
                return true;
            }
            let mut watch = watch.borrow_mut();
            if watch.record_closed(inner.stall_warning_ticks.get()) {
                inner.stall_warnings.set(inner.stall_warnings.get() + 1);
                warn!(
                    "{:?} gate for {} has been closed for {} ticks ({} predicates)",
                    phase,
                    scene,
                    watch.closed_for(),
                    inner.readiness(phase).borrow().len()
                );
            }
            false
        })
    }

    /// Checks a gate now; if it is closed, yields until it opens.
    fn await_gate(&self, phase: ReadinessPhase, cx: &mut TaskContext<'_>) -> Option<Step> {
        if self.inner.gate_open(phase) {
            None
        } else {
            Some(cx.until(self.gate(phase)))
        }
    }

    fn start(&self) {
        let inner = &self.inner;
        let scene = &self.request.scene;

        if let Some(transition) = &self.request.transition_scene {
            info!("Loading transition scene {}", transition);
            inner.backend.borrow_mut().load_immediate(transition);
        }

        info!("Pre-loading {}", scene);
        inner.emit(TransitionEvent::PreLoad(scene.clone()));
        inner.backend.borrow_mut().begin_load(scene);

        inner.enter(TransitionPhase::PreLoadAsyncGate);
        inner.emit(TransitionEvent::PreLoadAsync(scene.clone()));
    }

    /// Polls the background load once. Returns true once it is active.
    fn poll_activation(&mut self) -> bool {
        let progress = self.inner.backend.borrow_mut().poll_progress();
        self.inner.report_progress(progress);

        if !self.allowed && progress >= ACTIVATION_THRESHOLD {
            debug!("Allowing activation of {}", self.request.scene);
            self.inner.backend.borrow_mut().allow_activation();
            self.allowed = true;
        }

        self.allowed && self.inner.backend.borrow_mut().is_done()
    }

    fn finish(&self) {
        let scene = self.request.scene.clone();
        {
            let mut state = self.inner.state.borrow_mut();
            state.phase = TransitionPhase::Idle;
            state.target = None;
        }
        info!("Scene {} is ready", scene);
        self.inner.emit(TransitionEvent::LoadComplete(scene));
    }
}

impl Task for Transition {
    fn resume(&mut self, cx: &mut TaskContext<'_>) -> Step {
        loop {
            match self.stage {
                Stage::Start => {
                    self.start();
                    self.stage = Stage::PreLoadGate;
                    if let Some(wait) = self.await_gate(ReadinessPhase::PreLoad, cx) {
                        return wait;
                    }
                }
                Stage::PreLoadGate => {
                    info!("Pre-load of {} finished", self.request.scene);
                    self.inner.enter(TransitionPhase::Activation);
                    self.inner.reset_progress();
                    self.stage = Stage::Activation;
                }
                Stage::Activation => {
                    if !self.poll_activation() {
                        return cx.next_frame();
                    }
                    self.stage = Stage::AfterLoad;
                }
                Stage::AfterLoad => {
                    let scene = &self.request.scene;
                    info!("After-loading {}", scene);
                    self.inner.enter(TransitionPhase::AfterLoad);
                    self.inner.emit(TransitionEvent::AfterLoad(scene.clone()));
                    self.inner.enter(TransitionPhase::AfterLoadAsyncGate);
                    self.inner.emit(TransitionEvent::AfterLoadAsync(scene.clone()));

                    self.stage = Stage::AfterLoadGate;
                    if let Some(wait) = self.await_gate(ReadinessPhase::AfterLoad, cx) {
                        return wait;
                    }
                }
                Stage::AfterLoadGate => {
                    self.inner.enter(TransitionPhase::Settling);
                    self.inner.report_progress(1.0);
                    self.stage = Stage::Settle;
                }
                Stage::Settle => {
                    self.stage = Stage::Finish;
                    if !self.request.react_delay.is_zero() {
                        return cx.seconds(self.request.react_delay);
                    }
                }
                Stage::Finish => {
                    self.finish();
                    return Step::Done;
                }
            }
        }
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

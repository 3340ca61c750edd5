//=========================================================================
// Scene Backend
//=========================================================================
//
// The interface through which the coordinator loads scene content.
//
// Load protocol:
//   begin_load(scene) ──> poll_progress() rises towards 0.9
//                               │ >= 0.9
//                               ▼
//                     allow_activation() ──> is_done() == true
//                                              (scene is now active)
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::RefCell;
use std::rc::Rc;

use log::{debug, warn};

//=== Constants ===========================================================

/// Progress at which a background load is waiting for activation.
pub const ACTIVATION_THRESHOLD: f32 = 0.9;

//=== SceneBackend ========================================================

/// Scene-loading operations the coordinator relies on.
///
/// Implemented by engine glue. All calls happen on the pump thread.
pub trait SceneBackend {
    /// Name of the scene that is currently live.
    fn active_scene(&self) -> String;

    /// Loads and activates `scene` within the call.
    fn load_immediate(&mut self, scene: &str);

    /// Starts loading `scene` in the background without activating it.
    fn begin_load(&mut self, scene: &str);

    /// Progress of the background load in `[0, 1]`. Stops at
    /// [`ACTIVATION_THRESHOLD`] until activation is allowed.
    fn poll_progress(&mut self) -> f32;

    /// Lets the background load finish and become the active scene.
    fn allow_activation(&mut self);

    /// Whether the background load has been activated.
    fn is_done(&mut self) -> bool;
}

/// Shared handle to the scene backend.
pub type SharedBackend = Rc<RefCell<dyn SceneBackend>>;

//=== HeadlessSceneBackend ================================================

#[derive(Debug)]
struct PendingLoad {
    scene: String,
    progress: f32,
    allowed: bool,
}

/// Scripted backend for tools and tests.
///
/// Every poll advances progress by a fixed step, holding at the
/// activation threshold until activation is allowed.
#[derive(Debug)]
pub struct HeadlessSceneBackend {
    active: String,
    pending: Option<PendingLoad>,
    load_step: f32,
    history: Vec<String>,
}

impl HeadlessSceneBackend {
    pub fn new(initial: &str) -> Self {
        Self {
            active: initial.to_owned(),
            pending: None,
            load_step: 0.3,
            history: vec![initial.to_owned()],
        }
    }

    /// Sets the progress gained per poll.
    ///
    /// # Panics
    ///
    /// Panics if `step` is not positive.
    pub fn with_load_step(mut self, step: f32) -> Self {
        assert!(step > 0.0, "Load step must be positive, got {}", step);
        self.load_step = step;
        self
    }

    /// Every scene that became active, in order, starting with the
    /// initial one.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    fn activate(&mut self, scene: String) {
        debug!("Headless backend activated {}", scene);
        self.history.push(scene.clone());
        self.active = scene;
    }
}

impl SceneBackend for HeadlessSceneBackend {
    fn active_scene(&self) -> String {
        self.active.clone()
    }

    fn load_immediate(&mut self, scene: &str) {
        self.activate(scene.to_owned());
    }

    fn begin_load(&mut self, scene: &str) {
        if let Some(previous) = &self.pending {
            warn!("Replacing unfinished background load of {}", previous.scene);
        }
        self.pending = Some(PendingLoad {
            scene: scene.to_owned(),
            progress: 0.0,
            allowed: false,
        });
    }

    fn poll_progress(&mut self) -> f32 {
        let step = self.load_step;
        match self.pending.as_mut() {
            Some(load) => {
                let cap = if load.allowed { 1.0 } else { ACTIVATION_THRESHOLD };
                load.progress = (load.progress + step).min(cap);
                load.progress
            }
            None => 1.0,
        }
    }

    fn allow_activation(&mut self) {
        if let Some(load) = self.pending.as_mut() {
            load.allowed = true;
        }
    }

    fn is_done(&mut self) -> bool {
        let finished = self
            .pending
            .as_ref()
            .is_some_and(|load| load.allowed && load.progress >= 1.0);

        if finished {
            if let Some(load) = self.pending.take() {
                self.activate(load.scene);
            }
        }
        self.pending.is_none()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

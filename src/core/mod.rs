//=========================================================================
// Core Systems
//=========================================================================
//
// Lifecycle substrate pumped once per tick by the runtime.
//
// Layers (leaves first):
//   time, wait     frame clock and reusable suspension tokens
//   task           cooperative scheduler built on wait tokens
//   stage          scene-graph boundary (engine glue plugs in here)
//   pool           per-template agents and the registry
//   event, scene   typed observers and the transition coordinator
//   config, error  start-up configuration and error taxonomy
//
// Everything here is single-threaded: shared state is Rc<RefCell<_>>,
// owned by the thread that calls Runtime::tick().
//
//=========================================================================

//=== Module Declarations =================================================

pub mod config;
pub mod error;
pub mod event;
pub mod pool;
pub mod scene;
pub mod stage;
pub mod task;
pub mod time;
pub mod wait;

//=== Public API ==========================================================

pub use config::{Config, RuntimeSettings, SceneOverrides};
pub use error::{ConfigError, PoolError, SceneError};
pub use event::{Observers, SubscriberId};
pub use pool::{AsyncHandle, Instance, Placement, PoolAgent, PoolRegistry, PoolSetting, ResizeMode};
pub use scene::{
    HeadlessSceneBackend, LoadRequest, ReadinessPhase, SceneBackend, SceneCoordinator,
    TransitionEvent, TransitionPhase,
};
pub use stage::{MemoryGraph, NodeId, SceneGraph, SharedGraph, Template, Transform};
pub use task::{Scheduler, Step, Task, TaskContext, TaskId};
pub use time::{FrameClock, FrameTime};
pub use wait::{Predicate, Wait, WaitStats, Waits};

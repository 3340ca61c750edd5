//=========================================================================
// Prelude
//=========================================================================
//
// Convenience module that re-exports commonly used types and traits.
//
// Usage:
//   use aetheric_lifecycle::prelude::*;
//
//=========================================================================

//=== Public API ==========================================================

// Runtime
pub use crate::engine::{Runtime, RuntimeBuilder, RuntimeCommand, TickControl};

// Configuration and errors
pub use crate::core::config::Config;
pub use crate::core::error::{ConfigError, PoolError, SceneError};

// Pooling
pub use crate::core::pool::{Instance, Placement, PoolRegistry, PoolSetting, ResizeMode};

// Scene transitions
pub use crate::core::scene::{
    LoadRequest, ReadinessPhase, SceneBackend, SceneCoordinator, TransitionEvent, TransitionPhase,
};

// Scene graph boundary
pub use crate::core::stage::{NodeId, SceneGraph, Template, Transform};

// Cooperative tasks
pub use crate::core::task::{Step, Task, TaskContext};
pub use crate::core::wait::Wait;

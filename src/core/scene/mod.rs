//=========================================================================
// Scene Transitions
//=========================================================================
//
// Phased scene switching gated on caller-registered readiness checks.
//
// Architecture:
//   SceneCoordinator
//     ├─ Observers<TransitionEvent>     typed broadcast + channels
//     ├─ ReadinessSet × 2               PreLoad / AfterLoad gates
//     └─ SceneBackend                   engine-side loading
//
// Flow:
//   load_scene() → Transition task → events + gates → LoadComplete
//
//=========================================================================

//=== Module Declarations =================================================

mod backend;
mod coordinator;
mod readiness;

//=== Public API ==========================================================

pub use backend::{HeadlessSceneBackend, SceneBackend, SharedBackend, ACTIVATION_THRESHOLD};
pub use coordinator::{LoadRequest, SceneCoordinator, TransitionEvent, TransitionPhase};
pub use readiness::ReadinessPhase;

//=========================================================================
// Object Pooling
//=========================================================================
//
// Reuses scene-graph instances instead of creating and destroying them
// every time gameplay asks for one.
//
// Architecture:
//   PoolRegistry
//     └─ PoolAgent (one per template)
//          ├─ ready / applied / returning
//          └─ async resize task (frame-sliced, at most one)
//
// Tick ordering:
//   consumer update → scheduler tick → PoolRegistry::late_update()
//
//=========================================================================

//=== Module Declarations =================================================

mod agent;
mod handle;
mod registry;
mod setting;

//=== Public API ==========================================================

pub use agent::{Instance, Placement, PoolAgent};
pub use handle::AsyncHandle;
pub use registry::{PoolRegistry, POOL_ROOT_NAME};
pub use setting::{PoolSetting, ResizeMode, DEFAULT_BATCH_SIZE, DEFAULT_FRAME_INTERVAL};

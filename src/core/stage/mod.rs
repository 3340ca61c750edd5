//=========================================================================
// Stage Boundary
//=========================================================================
//
// The interface through which the core touches the engine's scene graph.
//
// The pool never renders, animates or parents anything itself; it asks
// the SceneGraph to instantiate, move, activate and destroy nodes. A
// headless MemoryGraph implementation is provided for tools and tests.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::Deserialize;

//=== Module Declarations =================================================

mod memory;

//=== Public API ==========================================================

pub use memory::{MemoryGraph, MemoryNode};

//=== Template ============================================================

/// Immutable blueprint identifier for a class of spawnable instances.
///
/// Cheap to clone; compares and hashes by name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(from = "String")]
pub struct Template(Rc<str>);

impl Template {
    pub fn new(name: &str) -> Self {
        Self(Rc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<String> for Template {
    fn from(name: String) -> Self {
        Self(Rc::from(name))
    }
}

impl From<&str> for Template {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Template({})", self.0)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//=== NodeId ==============================================================

/// Handle to a node owned by the scene graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

//=== Transform ===========================================================

/// World position and orientation (quaternion, `[x, y, z, w]`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: [0.0, 0.0, 0.0],
        rotation: [0.0, 0.0, 0.0, 1.0],
    };

    pub fn at(position: [f32; 3]) -> Self {
        Self { position, ..Self::IDENTITY }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

//=== SceneGraph ==========================================================

/// Scene-graph operations the pool relies on.
///
/// Implemented by engine glue. All calls happen on the pump thread.
pub trait SceneGraph {
    /// Canonical spawn transform stored on the template.
    fn template_transform(&self, template: &Template) -> Transform;

    /// Shows or hides the template itself.
    fn set_template_active(&mut self, template: &Template, active: bool);

    /// Creates an empty grouping node.
    fn create_node(&mut self, name: &str, parent: Option<NodeId>) -> NodeId;

    /// Clones `template` under `parent`. The clone inherits the template's
    /// activation state, which the pool keeps at inactive.
    fn instantiate(
        &mut self,
        template: &Template,
        name: &str,
        transform: Transform,
        parent: NodeId,
    ) -> NodeId;

    fn destroy(&mut self, node: NodeId);

    fn set_active(&mut self, node: NodeId, active: bool);

    fn set_transform(&mut self, node: NodeId, transform: Transform);

    /// Re-parents a node. With `keep_world` the world transform is kept,
    /// otherwise the current transform is reinterpreted relative to the
    /// new parent.
    fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>, keep_world: bool);
}

/// Shared handle to the scene graph used by every pool agent.
pub type SharedGraph = Rc<RefCell<dyn SceneGraph>>;

//=========================================================================
// Unit Tests
//=========================================================================

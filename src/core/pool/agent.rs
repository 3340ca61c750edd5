//=========================================================================
// Pool Agent
//=========================================================================
//
// Owns every instance cloned from one template.
//
// Instance sets:
//   applied    every live instance (|applied| is the pool size)
//   ready      inactive, available for spawn (LIFO)
//   returning  handed back, deactivated by the end-of-tick drain
//
//   ready ⊆ applied, returning ⊆ applied, ready ∩ returning = ∅
//
// Flow:
//   spawn ──> pop ready | instantiate (overflow) ──> activate ──> Instance
//   return_instance ──> returning (now, or via delayed task)
//   drain_returning (end of tick) ──> deactivate, reset, re-parent ──> ready
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use log::{debug, error, info, warn};

//=== Internal Dependencies ===============================================

use super::handle::AsyncHandle;
use super::setting::PoolSetting;
use crate::core::error::PoolError;
use crate::core::stage::{NodeId, SharedGraph, Template, Transform};
use crate::core::task::{Scheduler, Step};

//=== Instance ============================================================

/// A spawned instance on loan to the caller.
///
/// Not `Clone`: handing it back through `return_instance` consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct Instance {
    node: NodeId,
    template: Template,
}

impl Instance {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn template(&self) -> &Template {
        &self.template
    }
}

//=== Placement ===========================================================

/// Where a spawned instance ends up.
///
/// The default keeps the instance under its pool node at the template's
/// canonical transform.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Placement {
    transform: Option<Transform>,
    parent: Option<NodeId>,
    keep_world: bool,
}

impl Placement {
    /// Place at a world transform.
    pub fn at(transform: Transform) -> Self {
        Self {
            transform: Some(transform),
            parent: None,
            keep_world: true,
        }
    }

    /// Attach under `parent`. With `world_space` the pooled world transform
    /// is kept, otherwise it is reinterpreted relative to the parent.
    pub fn under(parent: NodeId, world_space: bool) -> Self {
        Self {
            transform: None,
            parent: Some(parent),
            keep_world: world_space,
        }
    }

    /// Adds a parent to a placement, keeping the world transform.
    pub fn with_parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self.keep_world = true;
        self
    }
}

//=== AgentState ==========================================================

struct AgentState {
    setting: PoolSetting,
    canonical: Transform,
    pool_node: NodeId,
    ready: Vec<NodeId>,
    applied: Vec<NodeId>,
    returning: Vec<NodeId>,
    in_flight: Option<AsyncHandle>,
}

impl AgentState {
    fn owns(&self, node: NodeId) -> bool {
        self.applied.contains(&node)
    }
}

//=== PoolAgent ===========================================================

/// Lifecycle owner for the instances of one template.
///
/// Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct PoolAgent {
    template: Template,
    state: Rc<RefCell<AgentState>>,
    graph: SharedGraph,
    scheduler: Rc<Scheduler>,
}

impl PoolAgent {
    //--- Construction -----------------------------------------------------

    /// Creates the agent's `<template>Pool` node under `root`, captures the
    /// template's canonical transform and hides the template.
    ///
    /// The pool starts empty; call [`resize`](Self::resize) to pre-warm.
    pub fn new(
        setting: PoolSetting,
        root: NodeId,
        graph: SharedGraph,
        scheduler: Rc<Scheduler>,
    ) -> Self {
        let template = setting.template.clone();

        let (canonical, pool_node) = {
            let mut graph = graph.borrow_mut();
            let canonical = graph.template_transform(&template);
            let pool_node = graph.create_node(&format!("{}Pool", template), Some(root));
            graph.set_template_active(&template, false);
            (canonical, pool_node)
        };

        info!("Created pool agent node for {}", template);

        Self {
            template,
            state: Rc::new(RefCell::new(AgentState {
                setting,
                canonical,
                pool_node,
                ready: Vec::new(),
                applied: Vec::new(),
                returning: Vec::new(),
                in_flight: None,
            })),
            graph,
            scheduler,
        }
    }

    //--- Spawn / Return ---------------------------------------------------

    /// Hands out an instance, instantiating a new one if none is ready.
    ///
    /// Never fails, even while an async resize is running.
    pub fn spawn(&self, placement: Placement) -> Instance {
        let node = {
            let mut state = self.state.borrow_mut();
            match state.ready.pop() {
                Some(node) => node,
                None => {
                    debug!("Pool {} is empty; instantiating an overflow instance", self.template);
                    self.apply(&mut state)
                }
            }
        };

        let mut graph = self.graph.borrow_mut();
        if let Some(transform) = placement.transform {
            graph.set_transform(node, transform);
        }
        if let Some(parent) = placement.parent {
            graph.set_parent(node, Some(parent), placement.keep_world);
        }
        // Activate last so the instance wakes up under its final parent.
        graph.set_active(node, true);

        Instance {
            node,
            template: self.template.clone(),
        }
    }

    /// Hands an instance back.
    ///
    /// With a zero `delay` it joins the returning buffer now; otherwise a
    /// task adds it once `delay` has elapsed. Either way it is deactivated
    /// by the next end-of-tick drain, never immediately.
    pub fn return_instance(&self, instance: Instance, delay: Duration) -> Result<(), PoolError> {
        let node = instance.node;

        if !self.state.borrow().owns(node) {
            return Err(self.not_owned(node));
        }

        if delay.is_zero() {
            self.push_returning(node);
        } else {
            let agent = self.clone();
            self.scheduler.delay(delay, move || agent.push_returning(node));
        }
        Ok(())
    }

    fn push_returning(&self, node: NodeId) {
        let mut state = self.state.borrow_mut();
        if !state.owns(node) {
            drop(state);
            self.not_owned(node);
            return;
        }
        state.returning.push(node);
    }

    fn not_owned(&self, node: NodeId) -> PoolError {
        let err = PoolError::NotOwned {
            template: self.template.clone(),
            node,
        };
        warn!("{}", err);
        err
    }

    /// Moves every returning instance back into `ready`: deactivated,
    /// reset to the canonical transform and re-parented under the pool
    /// node. The driver calls this once per tick after consumer logic.
    pub fn drain_returning(&self) {
        let mut state = self.state.borrow_mut();
        if state.returning.is_empty() {
            return;
        }

        let canonical = state.canonical;
        let pool_node = state.pool_node;
        let mut graph = self.graph.borrow_mut();

        while let Some(node) = state.returning.pop() {
            graph.set_active(node, false);
            graph.set_transform(node, canonical);
            graph.set_parent(node, Some(pool_node), true);
            state.ready.push(node);
        }
    }

    //--- Resize -----------------------------------------------------------

    /// Extends or shrinks to `size` within this call.
    ///
    /// Rejected while an async resize is in flight on this agent.
    pub fn resize(&self, size: usize) -> Result<(), PoolError> {
        let mut state = self.state.borrow_mut();
        if state.in_flight.is_some() {
            let err = PoolError::AsyncResizeInFlight(self.template.clone());
            error!("Sync resize of {} to {} rejected: {}", self.template, size, err);
            return Err(err);
        }

        info!("Pool {} resized from {} to {}", self.template, state.applied.len(), size);
        while state.applied.len() != size {
            self.step(&mut state, size);
        }
        Ok(())
    }

    /// Starts a frame-sliced resize: up to `batch_size` steps, then a wait
    /// of `frame_interval` ticks, repeated until the size matches. The
    /// first batch runs on the next tick.
    ///
    /// At most one async resize per agent; a second request is rejected
    /// and leaves the running one untouched.
    pub fn resize_async(
        &self,
        size: usize,
        frame_interval: u32,
        batch_size: usize,
    ) -> Result<AsyncHandle, PoolError> {
        let invalid = if frame_interval == 0 {
            Some("frame_interval must be at least 1")
        } else if batch_size == 0 {
            Some("batch_size must be at least 1")
        } else {
            None
        };
        if let Some(reason) = invalid {
            let err = PoolError::InvalidResize {
                template: self.template.clone(),
                reason,
            };
            error!("{}", err);
            return Err(err);
        }

        let handle = {
            let mut state = self.state.borrow_mut();
            if state.in_flight.is_some() {
                let err = PoolError::AsyncResizeInFlight(self.template.clone());
                error!("{}; wait for it to finish before requesting another", err);
                return Err(err);
            }
            info!(
                "Pool {} starting async resize from {} to {} ({} per {} ticks)",
                self.template,
                state.applied.len(),
                size,
                batch_size,
                frame_interval
            );

            let handle = AsyncHandle::new();
            state.in_flight = Some(handle.clone());
            handle
        };

        let agent = self.clone();
        self.scheduler.spawn_fn(move |cx| {
            if agent.resize_batch(size, batch_size) {
                agent.finish_async(size);
                Step::Done
            } else {
                cx.frames(frame_interval)
            }
        });

        Ok(handle)
    }

    /// Runs one batch and reports whether the target size was reached.
    fn resize_batch(&self, size: usize, batch_size: usize) -> bool {
        let mut state = self.state.borrow_mut();
        for _ in 0..batch_size {
            if state.applied.len() == size {
                break;
            }
            self.step(&mut state, size);
        }
        state.applied.len() == size
    }

    fn finish_async(&self, size: usize) {
        let handle = self.state.borrow_mut().in_flight.take();
        info!("Pool {} finished async resize at {}", self.template, size);
        if let Some(handle) = handle {
            handle.complete();
        }
    }

    /// One extend or shrink towards `size`.
    fn step(&self, state: &mut AgentState, size: usize) {
        if state.applied.len() < size {
            let node = self.apply(state);
            state.ready.push(node);
        } else if let Some(node) = state.applied.pop() {
            state.ready.retain(|n| *n != node);
            state.returning.retain(|n| *n != node);
            self.graph.borrow_mut().destroy(node);
        }
    }

    /// Instantiates one inactive instance under the pool node.
    fn apply(&self, state: &mut AgentState) -> NodeId {
        let name = format!("{} {}", self.template, state.applied.len());
        let node = self.graph.borrow_mut().instantiate(
            &self.template,
            &name,
            state.canonical,
            state.pool_node,
        );
        state.applied.push(node);
        node
    }

    //--- Teardown ---------------------------------------------------------

    /// Shows the template again. Called once at shutdown.
    pub fn teardown(&self) {
        if self.is_resizing() {
            warn!("Tearing down pool {} during an async resize", self.template);
        }
        self.graph.borrow_mut().set_template_active(&self.template, true);
    }

    //--- Queries ----------------------------------------------------------

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Default setting the agent was created with.
    pub fn setting(&self) -> PoolSetting {
        self.state.borrow().setting.clone()
    }

    pub fn pool_node(&self) -> NodeId {
        self.state.borrow().pool_node
    }

    /// Current pool size (`|applied|`).
    pub fn size(&self) -> usize {
        self.state.borrow().applied.len()
    }

    pub fn ready_len(&self) -> usize {
        self.state.borrow().ready.len()
    }

    pub fn returning_len(&self) -> usize {
        self.state.borrow().returning.len()
    }

    /// Instances on loan to callers, including those pending return.
    pub fn in_use(&self) -> usize {
        let state = self.state.borrow();
        state.applied.len() - state.ready.len()
    }

    pub fn is_resizing(&self) -> bool {
        self.state.borrow().in_flight.is_some()
    }

    /// Handle of the async resize currently running, if any.
    pub fn running_resize(&self) -> Option<AsyncHandle> {
        self.state.borrow().in_flight.clone()
    }

    pub fn is_ready(&self, node: NodeId) -> bool {
        self.state.borrow().ready.contains(&node)
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

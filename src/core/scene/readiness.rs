//=========================================================================
// Readiness Sets
//=========================================================================

//=== External Dependencies ===============================================

use std::rc::Rc;

//=== Internal Dependencies ===============================================

use crate::core::wait::Predicate;

//=== ReadinessPhase ======================================================

/// Gate a readiness predicate is registered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadinessPhase {
    /// Checked after the PreLoadAsync broadcast, before activation.
    PreLoad,

    /// Checked after the AfterLoadAsync broadcast, before completion.
    AfterLoad,
}

//=== ReadinessSet ========================================================

/// Predicates keyed by `Rc` identity, kept in registration order.
#[derive(Default)]
pub(crate) struct ReadinessSet {
    predicates: Vec<Predicate>,
}

impl ReadinessSet {
    pub fn insert(&mut self, predicate: Predicate) -> bool {
        if self.predicates.iter().any(|p| Rc::ptr_eq(p, &predicate)) {
            return false;
        }
        self.predicates.push(predicate);
        true
    }

    pub fn remove(&mut self, predicate: &Predicate) -> bool {
        let before = self.predicates.len();
        self.predicates.retain(|p| !Rc::ptr_eq(p, predicate));
        before != self.predicates.len()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Copies the predicates out so they can be evaluated with no borrow
    /// of the set held.
    pub fn snapshot(&self) -> Vec<Predicate> {
        self.predicates.clone()
    }
}

/// A gate is open when every predicate returns true. Empty gates are open.
pub(crate) fn all_ready(predicates: &[Predicate]) -> bool {
    predicates.iter().all(|ready| ready())
}

//=== StallWatch ==========================================================

/// Counts the ticks a gate has stayed closed.
#[derive(Debug, Default)]
pub(crate) struct StallWatch {
    closed_for: u32,
}

impl StallWatch {
    /// Records one closed tick. Returns true only on the tick the count
    /// reaches `limit`.
    pub fn record_closed(&mut self, limit: Option<u32>) -> bool {
        self.closed_for = self.closed_for.saturating_add(1);
        limit == Some(self.closed_for)
    }

    pub fn closed_for(&self) -> u32 {
        self.closed_for
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

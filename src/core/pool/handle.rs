//=========================================================================
// Async Handle
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

//=== AsyncHandle =========================================================

struct HandleState {
    done: Cell<bool>,
    callbacks: RefCell<Vec<Box<dyn FnOnce()>>>,
}

/// One-shot completion signal for an in-flight async resize.
///
/// Goes from pending to done exactly once. Observe it by polling
/// [`is_done`](Self::is_done) or by registering [`on_done`](Self::on_done)
/// callbacks. Clones observe the same signal.
#[derive(Clone)]
pub struct AsyncHandle {
    state: Rc<HandleState>,
}

impl AsyncHandle {
    pub(crate) fn new() -> Self {
        Self {
            state: Rc::new(HandleState {
                done: Cell::new(false),
                callbacks: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state.done.get()
    }

    /// Runs `callback` once the handle completes, or right away if it
    /// already has.
    pub fn on_done<F: FnOnce() + 'static>(&self, callback: F) {
        if self.is_done() {
            callback();
        } else {
            self.state.callbacks.borrow_mut().push(Box::new(callback));
        }
    }

    /// Marks the handle done and fires pending callbacks. Later calls are
    /// no-ops.
    pub(crate) fn complete(&self) {
        if self.state.done.replace(true) {
            return;
        }
        let callbacks = self.state.callbacks.take();
        for callback in callbacks {
            callback();
        }
    }
}

impl fmt::Debug for AsyncHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncHandle")
            .field("done", &self.is_done())
            .finish()
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_exactly_once() {
        let handle = AsyncHandle::new();
        let fired = Rc::new(Cell::new(0u32));

        let seen = Rc::clone(&fired);
        handle.on_done(move || seen.set(seen.get() + 1));
        assert!(!handle.is_done());
        assert_eq!(fired.get(), 0);

        handle.complete();
        handle.complete();
        assert!(handle.is_done());
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn late_callback_runs_immediately() {
        let handle = AsyncHandle::new();
        handle.complete();

        let fired = Rc::new(Cell::new(false));
        let seen = Rc::clone(&fired);
        handle.on_done(move || seen.set(true));
        assert!(fired.get());
    }

    #[test]
    fn clones_share_state() {
        let handle = AsyncHandle::new();
        let observer = handle.clone();
        handle.complete();
        assert!(observer.is_done());
    }
}

//=========================================================================
// Cooperative Scheduler
//=========================================================================
//
// Runs multi-tick operations as explicit state machines.
//
// Architecture:
//   spawn(task) ──> incoming ──(next tick)──> running
//                                                │
//   tick(now): for each slot in spawn order      ▼
//     suspended? ── keep_waiting(now) ──yes──> skip
//         │no
//         ▼
//     release token → resume(task) → Yield(wait) | Done
//
// Single-threaded. Nothing here is Send; the runtime pumps tick() once
// per frame from the thread that owns it.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::{Cell, RefCell};
use std::time::Duration;

use log::trace;

//=== Internal Dependencies ===============================================

use crate::core::time::FrameTime;
use crate::core::wait::{Predicate, Suspended, Wait, WaitStats, Waits};

//=== Step ================================================================

/// Result of resuming a task once.
#[derive(Debug)]
pub enum Step {
    /// Suspend until the wait ends, then resume again.
    Yield(Wait),

    /// The task is finished and will be dropped.
    Done,
}

//=== TaskContext =========================================================

/// Per-resume view of the scheduler handed to a task.
pub struct TaskContext<'a> {
    now: FrameTime,
    waits: &'a mut Waits,
}

impl<'a> TaskContext<'a> {
    /// Clock snapshot of the tick being processed.
    pub fn now(&self) -> FrameTime {
        self.now
    }

    /// Token factory for building waits.
    pub fn waits(&mut self) -> &mut Waits {
        &mut *self.waits
    }

    //--- Shorthands -------------------------------------------------------

    pub fn next_frame(&mut self) -> Step {
        Step::Yield(Wait::next_frame())
    }

    pub fn seconds(&mut self, duration: Duration) -> Step {
        Step::Yield(self.waits.seconds(duration))
    }

    pub fn frames(&mut self, frames: u32) -> Step {
        Step::Yield(self.waits.frames(frames))
    }

    pub fn until(&mut self, predicate: Predicate) -> Step {
        Step::Yield(self.waits.until(predicate))
    }

    pub fn during(&mut self, predicate: Predicate) -> Step {
        Step::Yield(self.waits.during(predicate))
    }
}

//=== Task ================================================================

/// A resumable unit of cooperative work.
///
/// `resume` runs until the task either needs to wait or is finished. It
/// must not block; anything that takes more than one tick yields.
pub trait Task {
    fn resume(&mut self, cx: &mut TaskContext<'_>) -> Step;
}

impl<F> Task for F
where
    F: FnMut(&mut TaskContext<'_>) -> Step,
{
    fn resume(&mut self, cx: &mut TaskContext<'_>) -> Step {
        self(cx)
    }
}

/// Identifier assigned to a spawned task, used in log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

//=== Slot ================================================================

struct Slot {
    id: TaskId,
    task: Box<dyn Task>,
    suspended: Option<Suspended>,
}

//=== Scheduler ===========================================================

/// Single-threaded cooperative task runner.
pub struct Scheduler {
    running: RefCell<Vec<Slot>>,
    incoming: RefCell<Vec<Slot>>,
    waits: RefCell<Waits>,
    last_stats: Cell<WaitStats>,
    next_id: Cell<u64>,
    now: Cell<FrameTime>,
}

impl Scheduler {
    /// Creates an empty scheduler whose seconds cache holds `seconds_capacity` entries.
    pub fn new(seconds_capacity: usize) -> Self {
        Self {
            running: RefCell::new(Vec::new()),
            incoming: RefCell::new(Vec::new()),
            waits: RefCell::new(Waits::new(seconds_capacity)),
            last_stats: Cell::new(WaitStats::default()),
            next_id: Cell::new(0),
            now: Cell::new(FrameTime::default()),
        }
    }

    //--- Spawning ---------------------------------------------------------

    /// Queues a task. It is first resumed on the next `tick`.
    pub fn spawn<T: Task + 'static>(&self, task: T) -> TaskId {
        let id = TaskId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        self.incoming.borrow_mut().push(Slot {
            id,
            task: Box::new(task),
            suspended: None,
        });

        trace!("Spawned task {:?}", id);
        id
    }

    /// Queues a closure as a task.
    pub fn spawn_fn<F>(&self, task: F) -> TaskId
    where
        F: FnMut(&mut TaskContext<'_>) -> Step + 'static,
    {
        self.spawn(task)
    }

    /// Runs `action` once, after `delay` of clock time.
    pub fn delay<F>(&self, delay: Duration, action: F) -> TaskId
    where
        F: FnOnce() + 'static,
    {
        let mut action = Some(action);
        let mut waited = false;

        self.spawn_fn(move |cx| {
            if !waited {
                waited = true;
                return cx.seconds(delay);
            }
            if let Some(action) = action.take() {
                action();
            }
            Step::Done
        })
    }

    //--- Pump -------------------------------------------------------------

    /// Advances every task by one tick.
    ///
    /// Tasks spawned while this runs are picked up on the following tick.
    pub fn tick(&self, now: FrameTime) {
        self.now.set(now);

        let mut running = self.running.take();
        running.append(&mut self.incoming.borrow_mut());

        {
            let mut waits = self.waits.borrow_mut();
            running.retain_mut(|slot| Self::advance(slot, now, &mut waits));
            self.last_stats.set(waits.stats());
        }

        let mut current = self.running.borrow_mut();
        running.append(&mut current);
        *current = running;
    }

    fn advance(slot: &mut Slot, now: FrameTime, waits: &mut Waits) -> bool {
        if let Some(suspended) = slot.suspended.as_mut() {
            if suspended.keep_waiting(now) {
                return true;
            }
        }

        if let Some(finished) = slot.suspended.take() {
            waits.release(finished.into_wait());
        }

        let mut cx = TaskContext { now, waits };
        match slot.task.resume(&mut cx) {
            Step::Yield(wait) => {
                slot.suspended = Some(Suspended::new(wait, now));
                true
            }
            Step::Done => {
                trace!("Task {:?} finished", slot.id);
                false
            }
        }
    }

    //--- Queries ----------------------------------------------------------

    /// Tasks that are running or waiting to start.
    pub fn task_count(&self) -> usize {
        self.running.borrow().len() + self.incoming.borrow().len()
    }

    /// Clock snapshot of the most recent tick.
    pub fn now(&self) -> FrameTime {
        self.now.get()
    }

    /// Token allocation counters.
    ///
    /// Called from inside a running task or predicate, this reports the
    /// counters as of the end of the previous tick.
    pub fn wait_stats(&self) -> WaitStats {
        match self.waits.try_borrow() {
            Ok(waits) => waits.stats(),
            Err(_) => self.last_stats.get(),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(crate::core::wait::DEFAULT_SECONDS_CACHE)
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

//=========================================================================
// Suspension Primitives
//=========================================================================
//
// Reusable wait tokens for cooperative tasks.
//
// Architecture:
//   Task ──resume()──> Step::Yield(Wait) ──> Scheduler slot (Suspended)
//                                                 │ once per tick
//                                                 ▼
//                                       keep_waiting(now)?  ──no──> release → Waits
//
// Token kinds:
//   Seconds    shared Rc, cached per duration in an LFU cache
//   Frames     free-list reuse, reset on acquire
//   Until      free-list reuse, waits while predicate is false
//   While      free-list reuse, waits while predicate is true
//   NextFrame  no token
//
//=========================================================================

//=== External Dependencies ===============================================

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use log::error;

//=== Internal Dependencies ===============================================

use crate::core::time::FrameTime;

//=== Module Declarations =================================================

mod lfu;

use lfu::LfuCache;

//=== Constants ===========================================================

/// Default number of distinct durations kept by the seconds cache.
pub const DEFAULT_SECONDS_CACHE: usize = 10;

//=== Predicate ===========================================================

/// Shared condition callback used by `until`/`while` waits and phase gates.
///
/// Identity (`Rc::ptr_eq`) is what readiness registration compares, so
/// keep the `Rc` around if you intend to unregister it later.
pub type Predicate = Rc<dyn Fn() -> bool>;

//=== Tokens ==============================================================

/// Immutable "wait for a duration" token, shared by every caller that
/// asks for the same duration.
#[derive(Debug, PartialEq, Eq)]
pub struct SecondsWait {
    duration: Duration,
}

impl SecondsWait {
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Frame-counting token. Reset on acquire, released on completion.
#[derive(Debug, Default)]
pub struct FramesWait {
    frames: u32,
    counted: u32,
}

impl FramesWait {
    fn reset(&mut self, frames: u32) {
        if frames == 0 {
            error!("Frame wait requested with 0 frames; it completes on its first check");
        }
        self.frames = frames;
        self.counted = 0;
    }

    /// Counts one tick and reports whether the wait is still running.
    fn keep_waiting(&mut self) -> bool {
        self.counted = self.counted.saturating_add(1);
        self.counted < self.frames
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }
}

/// Predicate-driven token used by both `until` and `while` waits.
#[derive(Default)]
pub struct ConditionWait {
    predicate: Option<Predicate>,
}

impl ConditionWait {
    fn reset(&mut self, predicate: Predicate) {
        self.predicate = Some(predicate);
    }

    fn evaluate(&self) -> bool {
        self.predicate.as_ref().is_some_and(|p| p())
    }
}

impl fmt::Debug for ConditionWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionWait")
            .field("armed", &self.predicate.is_some())
            .finish()
    }
}

//=== Wait ================================================================

/// What a suspended task is waiting for.
#[derive(Debug)]
pub enum Wait {
    /// Resume on the next tick.
    NextFrame,

    /// Resume once the shared duration has elapsed since the yield.
    Seconds(Rc<SecondsWait>),

    /// Resume after a number of ticks.
    Frames(FramesWait),

    /// Resume once the predicate returns true.
    Until(ConditionWait),

    /// Resume once the predicate returns false.
    While(ConditionWait),
}

impl Wait {
    /// Plain yield: resume on the next tick.
    pub fn next_frame() -> Self {
        Wait::NextFrame
    }
}

//=== Suspended ===========================================================

/// A wait in progress, owned by a scheduler slot.
///
/// The start time lives here rather than in the token, which is what
/// lets seconds tokens be shared between unrelated waits.
#[derive(Debug)]
pub(crate) struct Suspended {
    wait: Wait,
    since: Duration,
}

impl Suspended {
    pub fn new(wait: Wait, now: FrameTime) -> Self {
        Self { wait, since: now.elapsed }
    }

    /// Evaluated once per tick. Returns false the first tick the wait ends.
    pub fn keep_waiting(&mut self, now: FrameTime) -> bool {
        match &mut self.wait {
            Wait::NextFrame => false,
            Wait::Seconds(token) => now.elapsed.saturating_sub(self.since) < token.duration,
            Wait::Frames(token) => token.keep_waiting(),
            Wait::Until(token) => !token.evaluate(),
            Wait::While(token) => token.evaluate(),
        }
    }

    pub fn into_wait(self) -> Wait {
        self.wait
    }
}

//=== WaitStats ===========================================================

/// Allocation counters for the token factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitStats {
    /// Frame tokens created because the free list was empty.
    pub frames_allocated: u64,

    /// Condition tokens (until + while) created because a free list was empty.
    pub conditions_allocated: u64,

    /// Distinct durations currently held by the seconds cache.
    pub seconds_cached: usize,

    /// Durations evicted from the seconds cache.
    pub seconds_evictions: u64,

    /// Frame tokens waiting on the free list.
    pub frames_pooled: usize,

    /// Condition tokens waiting on the free lists.
    pub conditions_pooled: usize,
}

//=== Waits ===============================================================

/// Token factory: seconds cache plus free lists for the pooled kinds.
///
/// One instance is owned by the scheduler and lent to tasks through
/// `TaskContext::waits()`.
pub struct Waits {
    seconds: LfuCache<Duration, Rc<SecondsWait>>,
    frames: Vec<FramesWait>,
    until: Vec<ConditionWait>,
    during: Vec<ConditionWait>,
    frames_allocated: u64,
    conditions_allocated: u64,
}

impl Waits {
    /// Creates a factory whose seconds cache holds `seconds_capacity` durations.
    pub fn new(seconds_capacity: usize) -> Self {
        Self {
            seconds: LfuCache::new(seconds_capacity),
            frames: Vec::new(),
            until: Vec::new(),
            during: Vec::new(),
            frames_allocated: 0,
            conditions_allocated: 0,
        }
    }

    //--- Acquisition ------------------------------------------------------

    /// Wait for `duration` of clock time.
    ///
    /// Equal durations share one cached token while it stays in the cache;
    /// callers must not rely on token identity.
    pub fn seconds(&mut self, duration: Duration) -> Wait {
        if let Some(token) = self.seconds.get(&duration) {
            return Wait::Seconds(Rc::clone(token));
        }

        let token = Rc::new(SecondsWait { duration });
        self.seconds.insert(duration, Rc::clone(&token));
        Wait::Seconds(token)
    }

    /// Wait for `frames` ticks.
    pub fn frames(&mut self, frames: u32) -> Wait {
        let mut token = self.frames.pop().unwrap_or_else(|| {
            self.frames_allocated += 1;
            FramesWait::default()
        });
        token.reset(frames);
        Wait::Frames(token)
    }

    /// Wait until `predicate` returns true.
    pub fn until(&mut self, predicate: Predicate) -> Wait {
        let mut token = Self::acquire(&mut self.until, &mut self.conditions_allocated);
        token.reset(predicate);
        Wait::Until(token)
    }

    /// Wait while `predicate` returns true.
    pub fn during(&mut self, predicate: Predicate) -> Wait {
        let mut token = Self::acquire(&mut self.during, &mut self.conditions_allocated);
        token.reset(predicate);
        Wait::While(token)
    }

    fn acquire(list: &mut Vec<ConditionWait>, allocated: &mut u64) -> ConditionWait {
        list.pop().unwrap_or_else(|| {
            *allocated += 1;
            ConditionWait::default()
        })
    }

    //--- Release ----------------------------------------------------------

    /// Returns a finished token to its free list.
    ///
    /// Only the scheduler calls this, once per finished wait; the token is
    /// moved in, so it cannot be released twice.
    pub(crate) fn release(&mut self, wait: Wait) {
        match wait {
            Wait::NextFrame | Wait::Seconds(_) => {}
            Wait::Frames(token) => self.frames.push(token),
            Wait::Until(mut token) => {
                token.predicate = None;
                self.until.push(token);
            }
            Wait::While(mut token) => {
                token.predicate = None;
                self.during.push(token);
            }
        }
    }

    //--- Diagnostics ------------------------------------------------------

    pub fn stats(&self) -> WaitStats {
        WaitStats {
            frames_allocated: self.frames_allocated,
            conditions_allocated: self.conditions_allocated,
            seconds_cached: self.seconds.len(),
            seconds_evictions: self.seconds.evictions(),
            frames_pooled: self.frames.len(),
            conditions_pooled: self.until.len() + self.during.len(),
        }
    }
}

impl Default for Waits {
    fn default() -> Self {
        Self::new(DEFAULT_SECONDS_CACHE)
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn at(frame: u64, millis: u64) -> FrameTime {
        FrameTime {
            frame,
            elapsed: Duration::from_millis(millis),
            delta: Duration::from_millis(16),
        }
    }

    //--- Seconds ----------------------------------------------------------

    #[test]
    fn seconds_tokens_are_shared_per_duration() {
        let mut waits = Waits::default();
        let (Wait::Seconds(a), Wait::Seconds(b)) = (
            waits.seconds(Duration::from_millis(500)),
            waits.seconds(Duration::from_millis(500)),
        ) else {
            panic!("expected seconds tokens");
        };

        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(waits.stats().seconds_cached, 1);
    }

    #[test]
    fn same_duration_waits_finish_at_the_same_offset() {
        let mut waits = Waits::default();
        let delay = Duration::from_millis(100);

        let mut first = Suspended::new(waits.seconds(delay), at(0, 0));
        let mut second = Suspended::new(waits.seconds(delay), at(3, 50));

        assert!(first.keep_waiting(at(1, 99)));
        assert!(!first.keep_waiting(at(2, 100)));

        assert!(second.keep_waiting(at(4, 149)));
        assert!(!second.keep_waiting(at(5, 150)));
    }

    #[test]
    fn seconds_cache_keeps_frequent_durations() {
        let mut waits = Waits::new(2);
        let hot = Duration::from_millis(250);

        waits.seconds(hot);
        waits.seconds(hot);
        waits.seconds(Duration::from_millis(1));
        waits.seconds(Duration::from_millis(2));

        let stats = waits.stats();
        assert_eq!(stats.seconds_cached, 2);
        assert_eq!(stats.seconds_evictions, 1);
        assert!(waits.seconds.contains(&hot));
    }

    //--- Frames -----------------------------------------------------------

    #[test]
    fn frames_wait_ends_after_requested_ticks() {
        let mut waits = Waits::default();
        let mut suspended = Suspended::new(waits.frames(3), at(0, 0));

        assert!(suspended.keep_waiting(at(1, 16)));
        assert!(suspended.keep_waiting(at(2, 32)));
        assert!(!suspended.keep_waiting(at(3, 48)));
    }

    #[test]
    fn zero_frames_completes_on_first_check() {
        let mut waits = Waits::default();
        let mut suspended = Suspended::new(waits.frames(0), at(0, 0));
        assert!(!suspended.keep_waiting(at(1, 16)));
    }

    #[test]
    fn released_frame_tokens_are_reused() {
        let mut waits = Waits::default();

        let first = waits.frames(2);
        waits.release(first);
        assert_eq!(waits.stats().frames_pooled, 1);

        let mut second = Suspended::new(waits.frames(1), at(0, 0));
        assert_eq!(waits.stats().frames_allocated, 1);
        assert_eq!(waits.stats().frames_pooled, 0);

        // Reset on acquire: the reused token counts from zero again.
        assert!(!second.keep_waiting(at(1, 16)));
    }

    //--- Conditions -------------------------------------------------------

    #[test]
    fn until_waits_while_predicate_is_false() {
        let flag = Rc::new(Cell::new(false));
        let seen = Rc::clone(&flag);
        let mut waits = Waits::default();

        let mut suspended = Suspended::new(waits.until(Rc::new(move || seen.get())), at(0, 0));
        assert!(suspended.keep_waiting(at(1, 16)));

        flag.set(true);
        assert!(!suspended.keep_waiting(at(2, 32)));
    }

    #[test]
    fn during_waits_while_predicate_is_true() {
        let flag = Rc::new(Cell::new(true));
        let seen = Rc::clone(&flag);
        let mut waits = Waits::default();

        let mut suspended = Suspended::new(waits.during(Rc::new(move || seen.get())), at(0, 0));
        assert!(suspended.keep_waiting(at(1, 16)));

        flag.set(false);
        assert!(!suspended.keep_waiting(at(2, 32)));
    }

    #[test]
    fn release_drops_predicate_reference() {
        let predicate: Predicate = Rc::new(|| true);
        let mut waits = Waits::default();

        let wait = waits.until(Rc::clone(&predicate));
        assert_eq!(Rc::strong_count(&predicate), 2);

        waits.release(wait);
        assert_eq!(Rc::strong_count(&predicate), 1);
        assert_eq!(waits.stats().conditions_pooled, 1);
    }

    #[test]
    fn next_frame_never_keeps_waiting() {
        let mut suspended = Suspended::new(Wait::next_frame(), at(0, 0));
        assert!(!suspended.keep_waiting(at(1, 16)));
    }
}

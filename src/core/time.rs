//=========================================================================
// Frame Clock
//=========================================================================
//
// Tick counter and accumulated clock time for the cooperative pump.
//
// The driver advances the clock once per tick. Everything that waits on
// time (seconds tokens, delayed returns, settle delays) reads the
// FrameTime snapshot handed out by the clock, never Instant::now().
//
//=========================================================================

//=== External Dependencies ===============================================

use std::time::Duration;

//=== FrameTime ===========================================================

/// Snapshot of the clock for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameTime {
    /// Number of ticks advanced so far (first tick is 1).
    pub frame: u64,

    /// Clock time accumulated over all ticks.
    pub elapsed: Duration,

    /// Time advanced by the most recent tick.
    pub delta: Duration,
}

//=== FrameClock ==========================================================

/// Monotonic tick clock owned by the runtime.
#[derive(Debug, Default)]
pub struct FrameClock {
    now: FrameTime,
}

impl FrameClock {
    /// Creates a clock at frame 0, time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances one tick by `delta` and returns the new snapshot.
    pub fn advance(&mut self, delta: Duration) -> FrameTime {
        self.now.frame += 1;
        self.now.elapsed += delta;
        self.now.delta = delta;
        self.now
    }

    /// Returns the current snapshot.
    pub fn now(&self) -> FrameTime {
        self.now
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

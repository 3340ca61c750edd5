//=========================================================================
// Runtime
//=========================================================================
//
// Composition root and per-tick pump for the lifecycle core.
//
// Architecture:
// ```text
//     RuntimeBuilder  ──build(graph, backend)──>  Runtime  ──run()──> fixed-rate loop
//         │                                          │
//         ├─ with_tps()                              ├─ tick(dt) / tick_with(dt, update)
//         ├─ with_channel_capacity()                 ├─ command_sender()
//         ├─ with_stall_warning_ticks()              └─ shutdown()
//         └─ with_wait_cache_capacity()
// ```
//
// Tick order:
//   1. commands    load requests from other threads, shutdown
//   2. clock       advance by dt
//   3. update      consumer logic (spawn / return / load_scene ...)
//   4. scheduler   resume tasks whose waits ended
//   5. late        pool end-of-tick drain
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Sender};
use log::info;

//=== Internal Dependencies ===============================================

use crate::core::config::Config;
use crate::core::error::SceneError;
use crate::core::pool::PoolRegistry;
use crate::core::scene::{LoadRequest, SceneBackend, SceneCoordinator, SharedBackend};
use crate::core::stage::{SceneGraph, SharedGraph};
use crate::core::task::Scheduler;
use crate::core::time::{FrameClock, FrameTime};

//=== Module Declarations =================================================

mod collector;

//=== Public API ==========================================================

pub use collector::{RuntimeCommand, TickControl};

use collector::CommandCollector;

//=== RuntimeBuilder ======================================================

/// Builder for configuring and constructing a [`Runtime`].
///
/// Starts from the `[runtime]` section of the configuration; the `with_*`
/// methods override individual values.
///
/// # Examples
///
/// ```no_run
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use aetheric_lifecycle::RuntimeBuilder;
/// use aetheric_lifecycle::core::{Config, HeadlessSceneBackend, MemoryGraph};
///
/// let config = Config::load("pools.toml").expect("config");
/// let graph = Rc::new(RefCell::new(MemoryGraph::new()));
/// let backend = Rc::new(RefCell::new(HeadlessSceneBackend::new("Menu")));
///
/// RuntimeBuilder::new(config)
///     .with_tps(30.0)
///     .build(graph, backend)
///     .run();
/// ```
pub struct RuntimeBuilder {
    config: Config,
    tps: f64,
    channel_capacity: usize,
    stall_warning_ticks: Option<u32>,
    wait_cache_capacity: usize,
}

impl RuntimeBuilder {
    /// Creates a builder from a configuration.
    ///
    /// # Panics
    ///
    /// Panics if the configured tps or channel capacity is not positive.
    pub fn new(config: Config) -> Self {
        let runtime = config.runtime.clone();
        Self {
            config,
            tps: 60.0,
            channel_capacity: 128,
            stall_warning_ticks: runtime.stall_warning_ticks,
            wait_cache_capacity: runtime.wait_cache_capacity,
        }
        .with_tps(runtime.tps)
        .with_channel_capacity(runtime.channel_capacity)
    }

    /// Sets the tick rate used by [`Runtime::run`].
    ///
    /// # Panics
    ///
    /// Panics if `tps <= 0.0`.
    pub fn with_tps(mut self, tps: f64) -> Self {
        assert!(tps > 0.0, "TPS must be positive, got {}", tps);
        self.tps = tps;
        self
    }

    /// Sets the capacity of the command channel.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        assert!(capacity > 0, "Channel capacity must be positive");
        self.channel_capacity = capacity;
        self
    }

    /// Warn once when a readiness gate has been closed for `ticks` ticks.
    pub fn with_stall_warning_ticks(mut self, ticks: u32) -> Self {
        self.stall_warning_ticks = Some(ticks);
        self
    }

    /// Sets how many distinct durations the seconds-wait cache keeps.
    pub fn with_wait_cache_capacity(mut self, capacity: usize) -> Self {
        self.wait_cache_capacity = capacity;
        self
    }

    /// Wires scheduler, coordinator and pool registry, then pre-warms
    /// every pool for the backend's active scene.
    pub fn build<G, B>(self, graph: Rc<RefCell<G>>, backend: Rc<RefCell<B>>) -> Runtime
    where
        G: SceneGraph + 'static,
        B: SceneBackend + 'static,
    {
        info!(
            "Building runtime (TPS: {}, channel: {}, pools: {})",
            self.tps,
            self.channel_capacity,
            self.config.pools.len()
        );

        let graph: SharedGraph = graph;
        let backend: SharedBackend = backend;

        let scheduler = Rc::new(Scheduler::new(self.wait_cache_capacity));
        let coordinator = SceneCoordinator::new(Rc::clone(&scheduler), backend);
        coordinator.set_stall_warning_ticks(self.stall_warning_ticks);

        let pools = PoolRegistry::new(&self.config, graph, Rc::clone(&scheduler));
        pools.attach(&coordinator);
        pools.pre_warm(&coordinator.active_scene());

        let (sender, receiver) = bounded(self.channel_capacity);

        Runtime {
            clock: FrameClock::new(),
            scheduler,
            coordinator,
            pools,
            collector: CommandCollector::new(receiver),
            sender,
            tps: self.tps,
        }
    }
}

//=== Runtime =============================================================

/// Owns the lifecycle services and pumps them once per tick.
///
/// Not `Send`: the runtime and everything it owns stay on the thread that
/// built it. Other threads talk to it through [`command_sender`](Self::command_sender).
pub struct Runtime {
    clock: FrameClock,
    scheduler: Rc<Scheduler>,
    coordinator: SceneCoordinator,
    pools: PoolRegistry,
    collector: CommandCollector,
    sender: Sender<RuntimeCommand>,
    tps: f64,
}

impl Runtime {
    //--- Pump -------------------------------------------------------------

    /// Runs one tick with no consumer update.
    pub fn tick(&mut self, delta: Duration) -> TickControl {
        self.tick_with(delta, |_| {})
    }

    /// Runs one tick, calling `update` after commands and before the
    /// scheduler and the pool drain.
    pub fn tick_with<F>(&mut self, delta: Duration, update: F) -> TickControl
    where
        F: FnOnce(&Runtime),
    {
        //--- 1. Commands ---------------------------------------------------
        if self.collector.collect_frame() == TickControl::Exit {
            return TickControl::Exit;
        }
        for request in self.collector.take_requests() {
            let _ = self.coordinator.load_scene(request);
        }

        //--- 2. Clock ------------------------------------------------------
        let now = self.clock.advance(delta);

        //--- 3. Consumer update --------------------------------------------
        update(self);

        //--- 4. Cooperative tasks ------------------------------------------
        self.scheduler.tick(now);

        //--- 5. End-of-tick drain ------------------------------------------
        self.pools.late_update();

        TickControl::Continue
    }

    /// Ticks at the configured rate until a shutdown command arrives, then
    /// tears down.
    pub fn run(mut self) {
        let frame_duration = Duration::from_secs_f64(1.0 / self.tps);
        info!("Starting runtime loop (TPS: {})", self.tps);

        loop {
            let frame_start = Instant::now();

            if self.tick(frame_duration) == TickControl::Exit {
                info!("Runtime loop exiting");
                break;
            }

            self.collector.pace(frame_start + frame_duration);
        }

        self.shutdown();
    }

    /// Shows every pooled template again and drops the services.
    pub fn shutdown(self) {
        if self.coordinator.is_loading() {
            info!(
                "Shutting down during transition to {:?}",
                self.coordinator.target()
            );
        }
        self.pools.teardown();
        info!(
            "Runtime shutdown complete after {} ticks",
            self.clock.now().frame
        );
    }

    //--- Accessors --------------------------------------------------------

    pub fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    pub fn coordinator(&self) -> &SceneCoordinator {
        &self.coordinator
    }

    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.scheduler
    }

    /// Clock snapshot of the most recent tick.
    pub fn now(&self) -> FrameTime {
        self.clock.now()
    }

    /// Sender for commands from other threads.
    pub fn command_sender(&self) -> Sender<RuntimeCommand> {
        self.sender.clone()
    }

    /// Starts a scene transition from the pump thread.
    pub fn load_scene(&self, request: impl Into<LoadRequest>) -> Result<(), SceneError> {
        self.coordinator.load_scene(request)
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

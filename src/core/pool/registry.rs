//=========================================================================
// Pool Registry
//=========================================================================
//
// Template → PoolAgent lookup, per-scene setting overrides and the hooks
// that resize pools while a scene transition is being prepared.
//
// Architecture:
//   PoolRegistry
//     ├─ agents: Vec<PoolAgent>              configuration order
//     ├─ index: HashMap<Template, usize>
//     ├─ overrides: scene → template → PoolSetting
//     ├─ pending: Vec<AsyncHandle>           current transition only
//     └─ warming: Vec<AsyncHandle>           start-up pre-warm
//
// Transition hooks:
//   PreLoad(scene)       Sync agents  → resize(effective.size)
//   PreLoadAsync(scene)  Async agents → resize_async(...) → pending
//   PreLoad gate         open once every pending handle is done
//
// An agent that is still resizing when a hook fires gets its effective
// setting applied once that resize finishes; the chained handle goes into
// pending so the gate waits for the final size.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use log::{debug, error, info};

//=== Internal Dependencies ===============================================

use super::agent::{Instance, Placement, PoolAgent};
use super::handle::AsyncHandle;
use super::setting::{PoolSetting, ResizeMode};
use crate::core::config::Config;
use crate::core::error::PoolError;
use crate::core::scene::{ReadinessPhase, SceneCoordinator, TransitionEvent};
use crate::core::stage::{NodeId, SharedGraph, Template, Transform};
use crate::core::task::Scheduler;
use crate::core::wait::Predicate;

//=== Constants ===========================================================

/// Name of the grouping node every pool node lives under.
pub const POOL_ROOT_NAME: &str = "ObjectPool";

//=== RegistryInner =======================================================

struct RegistryInner {
    agents: Vec<PoolAgent>,
    index: HashMap<Template, usize>,
    overrides: HashMap<String, HashMap<Template, PoolSetting>>,
    pending: RefCell<Vec<AsyncHandle>>,
    warming: RefCell<Vec<AsyncHandle>>,
    root: NodeId,
}

impl RegistryInner {
    /// `override(scene, template) ?? default(template)`.
    fn effective(&self, scene: &str, agent: &PoolAgent) -> PoolSetting {
        self.overrides
            .get(scene)
            .and_then(|settings| settings.get(agent.template()))
            .cloned()
            .unwrap_or_else(|| agent.setting())
    }

    fn on_pre_load(&self, scene: &str) {
        let mut pending = self.pending.borrow_mut();
        pending.clear();

        for agent in &self.agents {
            let setting = self.effective(scene, agent);
            if setting.resize_mode == ResizeMode::Sync {
                pending.extend(apply_setting(agent, setting));
            }
        }
    }

    fn on_pre_load_async(&self, scene: &str) {
        let mut pending = self.pending.borrow_mut();
        for agent in &self.agents {
            let setting = self.effective(scene, agent);
            if setting.resize_mode == ResizeMode::Async {
                pending.extend(apply_setting(agent, setting));
            }
        }

        info!("Waiting on {} pool resizes for {}", pending.len(), scene);
    }

    fn pending_done(&self) -> bool {
        self.pending.borrow().iter().all(AsyncHandle::is_done)
    }
}

/// Resizes `agent` to `setting`. Returns a handle when the pool only
/// reaches that size on a later tick.
///
/// If an async resize is already running, the setting is applied after it
/// finishes and the returned handle completes once that follow-up does.
fn apply_setting(agent: &PoolAgent, setting: PoolSetting) -> Option<AsyncHandle> {
    if let Some(running) = agent.running_resize() {
        debug!(
            "Pool {} is still resizing; applying size {} afterwards",
            agent.template(),
            setting.size
        );
        let chained = AsyncHandle::new();
        let (agent, done) = (agent.clone(), chained.clone());
        running.on_done(move || match apply_setting(&agent, setting) {
            Some(next) => next.on_done(move || done.complete()),
            None => done.complete(),
        });
        return Some(chained);
    }

    match setting.resize_mode {
        ResizeMode::Sync => {
            let _ = agent.resize(setting.size);
            None
        }
        ResizeMode::Async => agent
            .resize_async(setting.size, setting.frame_interval, setting.batch_size)
            .ok(),
    }
}

//=== PoolRegistry ========================================================

/// Entry point for spawning, returning and resizing pooled instances.
///
/// Cheap to clone; clones share the same agents.
#[derive(Clone)]
pub struct PoolRegistry {
    inner: Rc<RegistryInner>,
}

impl PoolRegistry {
    //--- Construction -----------------------------------------------------

    /// Creates one agent per configured template under a shared pool root.
    ///
    /// Duplicate templates, and duplicate templates within one scene's
    /// overrides, are logged and the later entry is dropped. Pools are
    /// empty until [`pre_warm`](Self::pre_warm).
    pub fn new(config: &Config, graph: SharedGraph, scheduler: Rc<Scheduler>) -> Self {
        let root = graph.borrow_mut().create_node(POOL_ROOT_NAME, None);

        let mut agents = Vec::with_capacity(config.pools.len());
        let mut index = HashMap::with_capacity(config.pools.len());
        for setting in &config.pools {
            if index.contains_key(&setting.template) {
                error!("Duplicate pool setting for {}; ignoring it", setting.template);
                continue;
            }
            index.insert(setting.template.clone(), agents.len());
            agents.push(PoolAgent::new(
                setting.clone(),
                root,
                Rc::clone(&graph),
                Rc::clone(&scheduler),
            ));
        }

        let mut overrides: HashMap<String, HashMap<Template, PoolSetting>> = HashMap::new();
        for (scene, setting) in config.overrides() {
            let settings = overrides.entry(scene.to_owned()).or_default();
            if settings.contains_key(&setting.template) {
                error!(
                    "Duplicate override for {} in scene {}; ignoring it",
                    setting.template, scene
                );
                continue;
            }
            if !index.contains_key(&setting.template) {
                error!(
                    "Override for {} in scene {} has no default pool; it will never apply",
                    setting.template, scene
                );
            }
            settings.insert(setting.template.clone(), setting.clone());
        }

        info!("Pool registry created with {} agents", agents.len());

        Self {
            inner: Rc::new(RegistryInner {
                agents,
                index,
                overrides,
                pending: RefCell::new(Vec::new()),
                warming: RefCell::new(Vec::new()),
                root,
            }),
        }
    }

    /// Hooks the registry into scene transitions: sync resizes on
    /// `PreLoad`, async resizes on `PreLoadAsync`, and one PreLoad
    /// readiness predicate that waits for those async resizes.
    pub fn attach(&self, coordinator: &SceneCoordinator) {
        let inner = Rc::clone(&self.inner);
        coordinator.subscribe(move |event| match event {
            TransitionEvent::PreLoad(scene) => inner.on_pre_load(scene),
            TransitionEvent::PreLoadAsync(scene) => inner.on_pre_load_async(scene),
            _ => {}
        });

        let inner = Rc::clone(&self.inner);
        let ready: Predicate = Rc::new(move || inner.pending_done());
        coordinator.register_readiness(ReadinessPhase::PreLoad, ready);
    }

    /// Sizes every pool for `scene` using its effective setting. Async
    /// pools fill over the following ticks; see [`is_warm`](Self::is_warm).
    pub fn pre_warm(&self, scene: &str) {
        info!("Pre-warming pools for {}", scene);
        let mut warming = self.inner.warming.borrow_mut();
        warming.clear();
        for agent in &self.inner.agents {
            let setting = self.inner.effective(scene, agent);
            warming.extend(apply_setting(agent, setting));
        }
    }

    /// True once every resize started by [`pre_warm`](Self::pre_warm) is done.
    pub fn is_warm(&self) -> bool {
        self.inner.warming.borrow().iter().all(AsyncHandle::is_done)
    }

    //--- Lookup -----------------------------------------------------------

    pub fn agent(&self, template: &Template) -> Result<&PoolAgent, PoolError> {
        match self.inner.index.get(template) {
            Some(&slot) => Ok(&self.inner.agents[slot]),
            None => {
                let err = PoolError::UnknownTemplate(template.clone());
                error!("{}", err);
                Err(err)
            }
        }
    }

    /// Agents in configuration order.
    pub fn agents(&self) -> impl Iterator<Item = &PoolAgent> {
        self.inner.agents.iter()
    }

    /// Effective setting for `template` while `scene` is being prepared.
    pub fn effective_setting(&self, scene: &str, template: &Template) -> Result<PoolSetting, PoolError> {
        let agent = self.agent(template)?;
        Ok(self.inner.effective(scene, agent))
    }

    pub fn root(&self) -> NodeId {
        self.inner.root
    }

    //--- Spawn / Return ---------------------------------------------------

    /// Spawns at the template's canonical transform under its pool node.
    pub fn spawn(&self, template: &Template) -> Result<Instance, PoolError> {
        self.spawn_with(template, Placement::default())
    }

    pub fn spawn_at(&self, template: &Template, transform: Transform) -> Result<Instance, PoolError> {
        self.spawn_with(template, Placement::at(transform))
    }

    pub fn spawn_under(
        &self,
        template: &Template,
        parent: NodeId,
        world_space: bool,
    ) -> Result<Instance, PoolError> {
        self.spawn_with(template, Placement::under(parent, world_space))
    }

    pub fn spawn_with(&self, template: &Template, placement: Placement) -> Result<Instance, PoolError> {
        Ok(self.agent(template)?.spawn(placement))
    }

    /// Hands an instance back to its pool, optionally after `delay`.
    pub fn return_instance(&self, instance: Instance, delay: Duration) -> Result<(), PoolError> {
        let agent = self.agent(instance.template())?;
        agent.return_instance(instance, delay)
    }

    //--- Resize -----------------------------------------------------------

    pub fn resize(&self, template: &Template, size: usize) -> Result<(), PoolError> {
        self.agent(template)?.resize(size)
    }

    pub fn resize_async(
        &self,
        template: &Template,
        size: usize,
        frame_interval: u32,
        batch_size: usize,
    ) -> Result<AsyncHandle, PoolError> {
        self.agent(template)?
            .resize_async(size, frame_interval, batch_size)
    }

    //--- Tick -------------------------------------------------------------

    /// End-of-tick drain of every agent's returning buffer.
    pub fn late_update(&self) {
        for agent in &self.inner.agents {
            agent.drain_returning();
        }
    }

    /// Shows every template again. Called once at shutdown.
    pub fn teardown(&self) {
        for agent in &self.inner.agents {
            agent.teardown();
        }
        info!("Pool registry torn down");
    }
}

//=========================================================================
// Unit Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scene::{HeadlessSceneBackend, SharedBackend};
    use crate::core::stage::{MemoryGraph, SceneGraph};
    use crate::core::time::FrameTime;
    use std::cell::Cell;

    //--- Test Helpers -----------------------------------------------------

    struct Fixture {
        graph: Rc<RefCell<MemoryGraph>>,
        scheduler: Rc<Scheduler>,
        registry: PoolRegistry,
        frame: Cell<u64>,
    }

    impl Fixture {
        fn new(config: Config) -> Self {
            let graph = Rc::new(RefCell::new(MemoryGraph::new()));
            for template in ["bullet", "spark"] {
                graph
                    .borrow_mut()
                    .add_template(Template::new(template), Transform::IDENTITY);
            }
            let shared: SharedGraph = graph.clone();
            let scheduler = Rc::new(Scheduler::default());
            let registry = PoolRegistry::new(&config, shared, Rc::clone(&scheduler));

            Self { graph, scheduler, registry, frame: Cell::new(0) }
        }

        fn tick(&self) {
            let frame = self.frame.get() + 1;
            self.frame.set(frame);
            self.scheduler.tick(FrameTime {
                frame,
                elapsed: Duration::from_millis(100 * frame),
                delta: Duration::from_millis(100),
            });
            self.registry.late_update();
        }

        fn size(&self, template: &str) -> usize {
            self.registry.agent(&Template::new(template)).unwrap().size()
        }
    }

    fn bullet() -> Template {
        Template::new("bullet")
    }

    //--- Construction -----------------------------------------------------

    #[test]
    fn duplicates_are_dropped() {
        let config = Config::default()
            .with_pool(PoolSetting::sync("bullet", 2))
            .with_pool(PoolSetting::sync("bullet", 9))
            .with_scene_override("Level2", PoolSetting::sync("bullet", 4))
            .with_scene_override("Level2", PoolSetting::sync("bullet", 8));
        let fx = Fixture::new(config);

        assert_eq!(fx.registry.agents().count(), 1);
        assert_eq!(fx.registry.agent(&bullet()).unwrap().setting().size, 2);
        assert_eq!(fx.registry.effective_setting("Level2", &bullet()).unwrap().size, 4);
    }

    #[test]
    fn agents_live_under_the_pool_root() {
        let fx = Fixture::new(Config::default().with_pool(PoolSetting::sync("bullet", 1)));
        let graph = fx.graph.borrow();

        assert_eq!(graph.node(fx.registry.root()).unwrap().name, POOL_ROOT_NAME);
        let pools = graph.children(fx.registry.root());
        assert_eq!(pools.len(), 1);
        assert_eq!(graph.node(pools[0]).unwrap().name, "bulletPool");
    }

    #[test]
    fn effective_setting_prefers_scene_override() {
        let config = Config::default()
            .with_pool(PoolSetting::sync("bullet", 5))
            .with_scene_override("Boss", PoolSetting::sliced("bullet", 50));
        let fx = Fixture::new(config);

        assert_eq!(fx.registry.effective_setting("Menu", &bullet()).unwrap().size, 5);
        let boss = fx.registry.effective_setting("Boss", &bullet()).unwrap();
        assert_eq!(boss.size, 50);
        assert_eq!(boss.resize_mode, ResizeMode::Async);
    }

    //--- Pre-warm / Spawn / Return ----------------------------------------

    #[test]
    fn pre_warm_sync_pool_then_round_trip() {
        let fx = Fixture::new(Config::default().with_pool(PoolSetting::sync("bullet", 5)));
        fx.registry.pre_warm("Menu");

        let agent = fx.registry.agent(&bullet()).unwrap().clone();
        assert_eq!(agent.size(), 5);
        assert_eq!(agent.ready_len(), 5);

        let spawned: Vec<Instance> = (0..5).map(|_| fx.registry.spawn(&bullet()).unwrap()).collect();
        assert_eq!(agent.ready_len(), 0);
        assert_eq!(agent.size(), 5);

        for instance in spawned {
            fx.registry.return_instance(instance, Duration::ZERO).unwrap();
        }
        assert_eq!(agent.ready_len(), 0);

        fx.tick();
        assert_eq!(agent.ready_len(), 5);
        assert_eq!(fx.graph.borrow().active_instances_of(&bullet()), 0);
    }

    #[test]
    fn pre_warm_async_pool_runs_over_ticks() {
        let fx = Fixture::new(
            Config::default().with_pool(PoolSetting::sliced("spark", 8).with_batch_size(3)),
        );
        fx.registry.pre_warm("Menu");
        assert_eq!(fx.size("spark"), 0);

        fx.tick();
        assert_eq!(fx.size("spark"), 3);
        fx.tick();
        fx.tick();
        assert_eq!(fx.size("spark"), 8);
    }

    #[test]
    fn unknown_template_is_rejected() {
        let fx = Fixture::new(Config::default());
        let ghost = Template::new("ghost");

        assert_eq!(
            fx.registry.spawn(&ghost).unwrap_err(),
            PoolError::UnknownTemplate(ghost.clone())
        );
        assert!(fx.registry.resize(&ghost, 3).is_err());
        assert!(fx.registry.resize_async(&ghost, 3, 1, 1).is_err());
    }

    #[test]
    fn spawn_under_attaches_to_parent() {
        let fx = Fixture::new(Config::default().with_pool(PoolSetting::sync("bullet", 1)));
        let holder = fx.graph.borrow_mut().create_node("holder", None);

        let instance = fx.registry.spawn_under(&bullet(), holder, true).unwrap();
        assert_eq!(fx.graph.borrow().node(instance.node()).unwrap().parent, Some(holder));
    }

    //--- Transition Hooks -------------------------------------------------

    #[test]
    fn transition_resizes_pools_with_scene_settings() {
        let config = Config::default()
            .with_pool(PoolSetting::sync("bullet", 2))
            .with_pool(PoolSetting::sliced("spark", 0))
            .with_scene_override("Level2", PoolSetting::sync("bullet", 6))
            .with_scene_override("Level2", PoolSetting::sliced("spark", 10).with_batch_size(5));
        let fx = Fixture::new(config);

        let backend: SharedBackend = Rc::new(RefCell::new(HeadlessSceneBackend::new("Menu")));
        let coordinator = SceneCoordinator::new(Rc::clone(&fx.scheduler), backend);
        fx.registry.attach(&coordinator);
        fx.registry.pre_warm(&coordinator.active_scene());
        assert_eq!(coordinator.readiness_count(ReadinessPhase::PreLoad), 1);

        coordinator.load_scene("Level2").unwrap();

        // Tick 1: PreLoad resizes bullet at once; spark starts next tick.
        fx.tick();
        assert_eq!(fx.size("bullet"), 6);
        assert_eq!(fx.size("spark"), 0);
        assert_eq!(coordinator.phase(), crate::core::scene::TransitionPhase::PreLoadAsyncGate);

        fx.tick();
        assert_eq!(fx.size("spark"), 5);
        fx.tick();
        assert_eq!(fx.size("spark"), 10);
        assert_eq!(coordinator.phase(), crate::core::scene::TransitionPhase::PreLoadAsyncGate);

        fx.tick();
        assert_eq!(coordinator.phase(), crate::core::scene::TransitionPhase::Activation);
    }

    #[test]
    fn scene_settings_wait_for_a_running_resize() {
        let config = Config::default()
            .with_pool(PoolSetting::sliced("spark", 6).with_batch_size(2))
            .with_scene_override("Level2", PoolSetting::sync("spark", 1));
        let fx = Fixture::new(config);

        let backend: SharedBackend = Rc::new(RefCell::new(HeadlessSceneBackend::new("Menu")));
        let coordinator = SceneCoordinator::new(Rc::clone(&fx.scheduler), backend);
        fx.registry.attach(&coordinator);
        fx.registry.pre_warm(&coordinator.active_scene());
        assert!(!fx.registry.is_warm());

        // Requested before the pre-warm batches have run.
        coordinator.load_scene("Level2").unwrap();

        fx.tick();
        assert_eq!(fx.size("spark"), 2);
        assert_eq!(coordinator.phase(), crate::core::scene::TransitionPhase::PreLoadAsyncGate);

        for _ in 0..20 {
            fx.tick();
            if !coordinator.is_loading() {
                break;
            }
        }

        assert!(!coordinator.is_loading());
        assert!(fx.registry.is_warm());
        assert_eq!(fx.size("spark"), 1);
    }

    #[test]
    fn caller_resize_is_followed_by_scene_setting() {
        let config = Config::default()
            .with_pool(PoolSetting::sync("bullet", 0))
            .with_scene_override("Level2", PoolSetting::sliced("bullet", 4).with_batch_size(4));
        let fx = Fixture::new(config);

        let backend: SharedBackend = Rc::new(RefCell::new(HeadlessSceneBackend::new("Menu")));
        let coordinator = SceneCoordinator::new(Rc::clone(&fx.scheduler), backend);
        fx.registry.attach(&coordinator);
        fx.registry.pre_warm(&coordinator.active_scene());
        assert!(fx.registry.is_warm());

        let manual = fx.registry.resize_async(&bullet(), 9, 1, 1).unwrap();
        coordinator.load_scene("Level2").unwrap();

        let mut gate_closed_ticks = 0;
        for _ in 0..40 {
            fx.tick();
            if coordinator.phase() == crate::core::scene::TransitionPhase::PreLoadAsyncGate {
                gate_closed_ticks += 1;
            }
            if !coordinator.is_loading() {
                break;
            }
        }

        assert!(manual.is_done());
        assert!(gate_closed_ticks >= 9);
        assert!(!coordinator.is_loading());
        assert_eq!(fx.size("bullet"), 4);
    }

    #[test]
    fn teardown_reactivates_templates() {
        let fx = Fixture::new(Config::default().with_pool(PoolSetting::sync("bullet", 1)));
        assert!(!fx.graph.borrow().is_template_active(&bullet()));

        fx.registry.teardown();
        assert!(fx.graph.borrow().is_template_active(&bullet()));
    }
}

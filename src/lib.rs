//=========================================================================
// Aetheric Lifecycle: Library Root
//
// Object pooling, phased scene transitions and cooperative waits for
// frame-driven game clients.
//
// Responsibilities:
// - Expose the runtime facade (`Runtime`, `RuntimeBuilder`)
// - Expose the core services for hosts that pump them on their own
// - Keep the command intake and pacing internal
//
// Typical usage:
// ```no_run
// use std::cell::RefCell;
// use std::rc::Rc;
// use aetheric_lifecycle::RuntimeBuilder;
// use aetheric_lifecycle::core::{Config, HeadlessSceneBackend, MemoryGraph};
//
// fn main() {
//     let graph = Rc::new(RefCell::new(MemoryGraph::new()));
//     let backend = Rc::new(RefCell::new(HeadlessSceneBackend::new("Menu")));
//     RuntimeBuilder::new(Config::default()).build(graph, backend).run();
// }
// ```
//
//=========================================================================

//--- Public Modules ------------------------------------------------------
//
// `core` holds the scheduler, pools, scene coordinator and the
// scene-graph boundary. Hosts with their own frame loop can wire these
// directly instead of going through `Runtime`.
//
pub mod core;
pub mod prelude;

//--- Internal Modules ----------------------------------------------------
//
// `engine` composes the core services and pumps them once per tick.
//
mod engine;

//--- Public Exports ------------------------------------------------------

pub use engine::{Runtime, RuntimeBuilder, RuntimeCommand, TickControl};

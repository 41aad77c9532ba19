//! ReplayTK playback harness
//!
//! Loads a scenario manifest, builds the entity histories and drives every
//! executor from one global clock.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      SimController                       │
//! │   clock (ReplayContext)  ──►  simulation time × speed    │
//! │        │                                                 │
//! │        ▼                                                 │
//! │  ┌───────────┐   ┌───────────┐                           │
//! │  │ Executor  │   │ Executor  │   ...   (one per entity)  │
//! │  └─────┬─────┘   └─────┬─────┘                           │
//! │        │  HistoryRegistry (read-only)                    │
//! │        ▼               ▼                                 │
//! │  ┌───────────────────────────┐      ┌──────────────┐     │
//! │  │   PoseSink (SceneGraph)   │      │   EventBus   │     │
//! │  └───────────────────────────┘      └──────────────┘     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use replaytk_sim::{Manifest, SceneGraph, SimContext, SimController, SimLoader};
//! use replaytk_env::FsLogSource;
//!
//! let source = FsLogSource::new("data");
//! let manifest = Manifest::load(&source, "scenario.json")?;
//! let sim = SimLoader::new(&source).load(&manifest)?;
//!
//! let mut controller = SimController::new(SimContext::shared(), SceneGraph::new());
//! controller.load(sim);
//! controller.play();
//! ```

mod config;
mod context;
pub mod controller;
pub mod events;
pub mod exporter;
pub mod loader;
pub mod manifest;
pub mod scene;

pub use config::PlaybackConfig;
pub use context::SimContext;
pub use controller::{PlaybackState, SimController};
pub use events::{EventBus, PlaybackEvent};
pub use exporter::{EntityFrame, PlaybackExport, PlaybackFrame};
pub use loader::{LoadError, LoadReport, LoadedSimulation, ScenarioEvent, SimHistory, SimLoader};
pub use manifest::Manifest;
pub use scene::SceneGraph;

//! Sessions, persistence snapshots, prompt assembly and turn orchestration
//! for the GM chat engine.

pub mod assembler;
pub mod scenario_source;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod turn;

pub use assembler::PromptAssembler;
pub use scenario_source::{DirScenarioSource, ScenarioSource, StaticScenarioSource};
pub use session::Session;
pub use snapshot::{load_snapshot, load_snapshot_value, LoadedState, SnapshotFormat};
pub use store::{SessionStore, SessionSummary};
pub use turn::{HydrateStatus, TurnOrchestrator, TurnPhase, TurnReport, SNAPSHOT_KEY};

//! ReplayTK Core - Recorded-history playback engine
//!
//! Turns textual state logs into per-entity timelines and resolves the pose
//! of every entity at an arbitrary playback instant:
//! 1. **Parsing**: 17-field log records with source-to-target basis conversion
//! 2. **Lookup**: binary search over time-ordered state windows
//! 3. **Resolution**: exact poses inside windows, interpolation across gaps,
//!    rebasing when the parent changes between two states

pub mod coords;
pub mod executor;
pub mod history;
pub mod log_parser;
pub mod registry;
pub mod time;

// Re-export key types for convenience
pub use executor::{resolve_pose, Pose, PoseSink, SimExecutor, StateLabel};
pub use history::{EntityHistory, EntityState, HistoryError, Interval, IntervalShape};
pub use log_parser::{parse_log, LogError, LogParser, ParsedLog, StateRecord};
pub use registry::{HistoryRegistry, ParentFrames, StaticFrame};
pub use replaytk_env::EntityId;
pub use time::Timestamp;

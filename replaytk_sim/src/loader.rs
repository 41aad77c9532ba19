//! Multi-phase simulation loading.
//!
//! Loading runs four phases in order, each finishing before the next starts:
//! parse every entity log, build histories and static frames, compute the
//! global time span, and create one executor per history.

use crate::manifest::{EntitySpec, Manifest};
use replaytk_core::registry::StaticFrame;
use replaytk_core::time::{add_seconds, parse_timestamp, seconds_between};
use replaytk_core::{
    EntityHistory, HistoryRegistry, LogError, LogParser, ParsedLog, SimExecutor, Timestamp,
};
use replaytk_env::{EntityId, EnvError, LogSource};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors that abort a load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read manifest: {0}")]
    Source(#[from] EnvError),

    #[error("Invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("Entity '{0}' is declared more than once")]
    DuplicateEntity(EntityId),

    #[error("Entity '{entity}' names unknown parent '{parent}'")]
    UnknownParent { entity: EntityId, parent: EntityId },

    #[error("Event '{uri}' has unparsable time '{token}'")]
    InvalidEventTime { uri: String, token: String },

    #[error("Simulation has no recorded states")]
    Empty,
}

/// Why one entity's log could not be used.
#[derive(Debug, Error)]
pub enum EntityLoadError {
    #[error(transparent)]
    Source(#[from] EnvError),

    #[error(transparent)]
    Parse(#[from] LogError),
}

/// A timestamped scenario annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioEvent {
    pub uri: String,
    pub category: String,
    pub time: Timestamp,
}

/// Simulation-wide metadata and time span.
#[derive(Debug, Clone)]
pub struct SimHistory {
    pub name: String,
    pub uri: String,
    pub description: String,
    pub details: String,

    /// Earliest recorded start over all entities
    pub start: Timestamp,

    /// Latest recorded end over all entities
    pub end: Timestamp,

    /// Scenario events, sorted by time
    pub events: Vec<ScenarioEvent>,
}

impl SimHistory {
    /// Length of the simulation in seconds.
    pub fn duration_secs(&self) -> f64 {
        seconds_between(self.start, self.end)
    }

    /// Absolute timestamp of a simulation time in seconds.
    pub fn date_time_at(&self, secs: f64) -> Timestamp {
        add_seconds(self.start, secs)
    }

    /// Simulation time in seconds of an absolute timestamp.
    pub fn seconds_at(&self, time: Timestamp) -> f64 {
        seconds_between(self.start, time)
    }

    /// Events passed while moving from `from` to `to` (seconds).
    ///
    /// The window excludes `from` and includes `to`, in either direction.
    pub fn events_between(&self, from: f64, to: f64) -> Vec<ScenarioEvent> {
        if from == to {
            return Vec::new();
        }
        self.events
            .iter()
            .filter(|event| {
                let at = self.seconds_at(event.time);
                if from < to {
                    at > from && at <= to
                } else {
                    at < from && at >= to
                }
            })
            .cloned()
            .collect()
    }
}

/// A log that failed to load.
#[derive(Debug)]
pub struct LoadFailure {
    pub entity: EntityId,
    pub log: String,
    pub error: EntityLoadError,
}

/// Outcome of a load, beyond the fatal errors.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Entities with a non-empty history
    pub loaded: Vec<EntityId>,

    /// Entities placed from a static transform only
    pub static_only: Vec<EntityId>,

    /// Logs that could not be read or parsed
    pub failures: Vec<LoadFailure>,

    /// Total number of overlapping record pairs over all histories
    pub overlaps: usize,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Everything a controller needs to play a simulation.
#[derive(Debug)]
pub struct LoadedSimulation {
    pub history: SimHistory,
    pub registry: HistoryRegistry,
    pub executors: Vec<SimExecutor>,
    pub report: LoadReport,
}

/// Loads simulations described by a manifest from a log source.
pub struct SimLoader<'a, S: LogSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: LogSource + ?Sized> SimLoader<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// Runs every load phase.
    ///
    /// A log that fails to read or parse is recorded in the report and its
    /// entity gets no history; the load itself only fails when the manifest
    /// is invalid or nothing at all was recorded.
    pub fn load(&self, manifest: &Manifest) -> Result<LoadedSimulation, LoadError> {
        manifest.validate()?;
        let mut report = LoadReport::default();

        // Phase 1: parse
        let parsed = self.parse_logs(manifest, &mut report);

        // Phase 2: histories and static frames
        let mut registry = HistoryRegistry::new();
        for (entity, log, parsed) in parsed {
            let history = EntityHistory::from_log(entity.clone(), &parsed).with_source(log);
            report.overlaps += history.overlaps().len();
            if history.is_empty() {
                warn!("Log of '{}' contains no records", entity);
            } else {
                report.loaded.push(entity);
            }
            registry.insert_history(history);
        }
        for spec in &manifest.entities {
            if let Some(transform) = &spec.transform {
                registry.insert_static(
                    spec.id.clone(),
                    StaticFrame {
                        parent: transform.parent_id(),
                        local: transform.isometry(),
                    },
                );
                if !report.loaded.contains(&spec.id) {
                    report.static_only.push(spec.id.clone());
                }
            }
        }

        // Phase 3: global span
        let (start, end) = registry.global_span().ok_or(LoadError::Empty)?;
        let history = SimHistory {
            name: manifest.name.clone(),
            uri: manifest.uri.clone(),
            description: manifest.description.clone(),
            details: manifest.details.clone(),
            start,
            end,
            events: scenario_events(manifest)?,
        };
        debug!(
            "Global span {} .. {} ({:.3}s)",
            start,
            end,
            history.duration_secs()
        );

        // Phase 4: executors
        let executors = registry
            .history_ids()
            .into_iter()
            .filter(|id| registry.history(id).is_some_and(|h| !h.is_empty()))
            .map(SimExecutor::new)
            .collect::<Vec<_>>();

        info!(
            "Loaded '{}': {} entities with history, {} static, {} failed",
            history.name,
            executors.len(),
            report.static_only.len(),
            report.failures.len()
        );

        Ok(LoadedSimulation {
            history,
            registry,
            executors,
            report,
        })
    }

    fn parse_logs(
        &self,
        manifest: &Manifest,
        report: &mut LoadReport,
    ) -> Vec<(EntityId, String, ParsedLog)> {
        let mut parsed = Vec::new();
        for spec in &manifest.entities {
            let Some(log) = &spec.log else {
                continue;
            };
            match self.parse_entity(spec, log, manifest.z_up) {
                Ok(records) => {
                    debug!("Parsed {} records for '{}'", records.records.len(), spec.id);
                    parsed.push((spec.id.clone(), log.clone(), records));
                }
                Err(e) => {
                    error!("Failed to load log '{}' of '{}': {}", log, spec.id, e);
                    report.failures.push(LoadFailure {
                        entity: spec.id.clone(),
                        log: log.clone(),
                        error: e,
                    });
                }
            }
        }
        parsed
    }

    fn parse_entity(
        &self,
        spec: &EntitySpec,
        log: &str,
        manifest_z_up: bool,
    ) -> Result<ParsedLog, EntityLoadError> {
        let text = self.source.read(log)?;
        let parser = LogParser::new(spec.z_up(manifest_z_up));
        Ok(parser.parse(&text)?)
    }
}

fn scenario_events(manifest: &Manifest) -> Result<Vec<ScenarioEvent>, LoadError> {
    let mut events = manifest
        .events
        .iter()
        .map(|spec| {
            parse_timestamp(&spec.time)
                .map(|time| ScenarioEvent {
                    uri: spec.uri.clone(),
                    category: spec.category.clone(),
                    time,
                })
                .ok_or_else(|| LoadError::InvalidEventTime {
                    uri: spec.uri.clone(),
                    token: spec.time.clone(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    events.sort_by_key(|event| event.time);
    Ok(events)
}

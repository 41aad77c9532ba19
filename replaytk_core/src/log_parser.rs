//! Recorded state log parsing.
//!
//! A log holds one state record per line. Fields are separated by runs of
//! spaces or tabs and every line carries exactly 17 of them:
//!
//! ```text
//! start end origin px py pz scale r0 r1 r2 r3 r4 r5 r6 r7 r8 parent
//! ```
//!
//! Positions are scaled to meters and converted to the playback basis; the
//! nine rotation values fill a 3x3 matrix column by column.

use crate::coords::{matrix_to_target_basis, vec_to_target_basis};
use crate::time::{parse_timestamp, Timestamp};
use nalgebra::{Matrix3, Vector3};
use replaytk_env::EntityId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Number of whitespace-separated fields in a record line.
pub const RECORD_FIELDS: usize = 17;

/// One recorded state, already converted to the playback basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Start of the validity window
    pub start_time: Timestamp,

    /// End of the validity window (never before `start_time`)
    pub end_time: Timestamp,

    /// Free-form tag naming the producer of the record
    pub origin: String,

    /// Position in meters, relative to the parent
    pub position: Vector3<f64>,

    /// Rotation relative to the parent
    pub rotation_matrix: Matrix3<f64>,

    /// Entity this record is expressed relative to (`None` = world space)
    pub parent_id: Option<EntityId>,
}

/// Errors raised while parsing a log. Any of them fails the whole log.
#[derive(Debug, Error)]
pub enum LogError {
    /// Wrong number of fields on a line
    #[error("line {line}: expected 17 fields, found {found}: {tokens:?}")]
    TokenCount {
        line: usize,
        found: usize,
        tokens: Vec<String>,
    },

    /// A time field could not be parsed
    #[error("line {line}, field {field}: invalid timestamp '{token}'")]
    InvalidTimestamp {
        line: usize,
        field: usize,
        token: String,
    },

    /// A numeric field could not be parsed
    #[error("line {line}, field {field}: invalid number '{token}'")]
    InvalidNumber {
        line: usize,
        field: usize,
        token: String,
    },

    /// The end of a validity window precedes its start
    #[error("line {line}: end time {end} precedes start time {start}")]
    InvertedWindow {
        line: usize,
        start: Timestamp,
        end: Timestamp,
    },
}

impl LogError {
    /// 1-based line number the error refers to.
    pub fn line(&self) -> usize {
        match self {
            LogError::TokenCount { line, .. }
            | LogError::InvalidTimestamp { line, .. }
            | LogError::InvalidNumber { line, .. }
            | LogError::InvertedWindow { line, .. } => *line,
        }
    }
}

/// Result of a successful parse.
#[derive(Debug, Clone, Default)]
pub struct ParsedLog {
    /// Records in file order
    pub records: Vec<StateRecord>,

    /// Start time of the first record
    pub history_start: Option<Timestamp>,

    /// Latest end time over all records
    pub history_end: Option<Timestamp>,
}

impl ParsedLog {
    /// Returns true if the log held no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parser for recorded state logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogParser {
    /// The recording used Z as its vertical axis
    pub source_z_up: bool,
}

impl LogParser {
    /// Creates a parser for the given source convention.
    pub fn new(source_z_up: bool) -> Self {
        Self { source_z_up }
    }

    /// Parses a whole log.
    ///
    /// Blank lines are skipped. The first malformed line aborts the parse and
    /// nothing parsed so far is returned.
    pub fn parse(&self, text: &str) -> Result<ParsedLog, LogError> {
        let mut parsed = ParsedLog::default();

        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;
            let tokens: Vec<&str> = line
                .split(|c| c == ' ' || c == '\t')
                .filter(|t| !t.is_empty())
                .collect();
            if tokens.is_empty() {
                continue;
            }

            let record = match self.parse_tokens(line_no, &tokens) {
                Ok(record) => record,
                Err(e) => {
                    warn!("{} line values in line {}: {}", tokens.len(), line_no, e);
                    for (i, token) in tokens.iter().enumerate() {
                        debug!("  {} {}", i, token);
                    }
                    return Err(e);
                }
            };

            if parsed.history_start.is_none() {
                parsed.history_start = Some(record.start_time);
            }
            if parsed.history_end.map_or(true, |end| end < record.end_time) {
                parsed.history_end = Some(record.end_time);
            }
            parsed.records.push(record);
        }

        Ok(parsed)
    }

    /// Parses the fields of a single line.
    pub fn parse_tokens(&self, line: usize, tokens: &[&str]) -> Result<StateRecord, LogError> {
        if tokens.len() != RECORD_FIELDS {
            return Err(LogError::TokenCount {
                line,
                found: tokens.len(),
                tokens: tokens.iter().map(|t| t.to_string()).collect(),
            });
        }

        let timestamp = |field: usize| {
            parse_timestamp(tokens[field]).ok_or_else(|| LogError::InvalidTimestamp {
                line,
                field,
                token: tokens[field].to_string(),
            })
        };
        let number = |field: usize| {
            tokens[field]
                .parse::<f64>()
                .map_err(|_| LogError::InvalidNumber {
                    line,
                    field,
                    token: tokens[field].to_string(),
                })
        };

        let start_time = timestamp(0)?;
        let end_time = timestamp(1)?;
        if end_time < start_time {
            return Err(LogError::InvertedWindow {
                line,
                start: start_time,
                end: end_time,
            });
        }

        let origin = tokens[2].to_string();
        let raw_position = Vector3::new(number(3)?, number(4)?, number(5)?);
        let scale_to_meter = number(6)?;
        let position = vec_to_target_basis(&(raw_position * scale_to_meter), self.source_z_up);

        // index n -> row n % 3, column n / 3
        let mut raw_rotation = Matrix3::identity();
        for n in 0..9 {
            raw_rotation[(n % 3, n / 3)] = number(7 + n)?;
        }
        let rotation_matrix = matrix_to_target_basis(&raw_rotation, self.source_z_up);

        Ok(StateRecord {
            start_time,
            end_time,
            origin,
            position,
            rotation_matrix,
            parent_id: EntityId::parent_ref(tokens[16]),
        })
    }
}

/// Convenience wrapper around [`LogParser::parse`].
pub fn parse_log(text: &str, source_z_up: bool) -> Result<ParsedLog, LogError> {
    LogParser::new(source_z_up).parse(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{epoch, seconds_between};
    use approx::assert_relative_eq;

    const IDENTITY: &str = "1 0 0 0 1 0 0 0 1";

    fn line(start: f64, end: f64, pos: [f64; 3], scale: f64, rot: &str, parent: &str) -> String {
        format!(
            "{} {}\tgps {} {} {} {} {} {}",
            start, end, pos[0], pos[1], pos[2], scale, rot, parent
        )
    }

    #[test]
    fn test_parse_scales_and_converts_position() {
        let text = line(0.0, 10.0, [100.0, 200.0, 300.0], 0.01, IDENTITY, "-");
        let parsed = parse_log(&text, false).unwrap();

        assert_eq!(parsed.records.len(), 1);
        let record = &parsed.records[0];
        assert_relative_eq!(record.position, Vector3::new(1.0, 2.0, -3.0), epsilon = 1e-12);
        assert_eq!(record.origin, "gps");
        assert_eq!(record.parent_id, None);
        assert_eq!(record.rotation_matrix, Matrix3::identity());
    }

    #[test]
    fn test_parse_fills_matrix_column_major() {
        let text = line(0.0, 1.0, [0.0, 0.0, 0.0], 1.0, "1 2 3 4 5 6 7 8 9", "truck");
        let parsed = parse_log(&text, true).unwrap();
        let record = &parsed.records[0];

        let raw = Matrix3::new(1.0, 4.0, 7.0, 2.0, 5.0, 8.0, 3.0, 6.0, 9.0);
        assert_eq!(record.rotation_matrix, matrix_to_target_basis(&raw, true));
        assert_eq!(record.parent_id, Some(EntityId::new("truck")));
    }

    #[test]
    fn test_history_end_tracks_maximum() {
        let text = [
            line(0.0, 50.0, [0.0; 3], 1.0, IDENTITY, "-"),
            line(20.0, 30.0, [0.0; 3], 1.0, IDENTITY, "-"),
            String::new(),
            line(10.0, 15.0, [0.0; 3], 1.0, IDENTITY, "-"),
        ]
        .join("\n");
        let parsed = parse_log(&text, false).unwrap();

        assert_eq!(parsed.records.len(), 3);
        assert_relative_eq!(seconds_between(epoch(), parsed.history_start.unwrap()), 0.0);
        assert_relative_eq!(seconds_between(epoch(), parsed.history_end.unwrap()), 50.0);
    }

    #[test]
    fn test_wrong_token_count_is_fatal() {
        let text = [
            line(0.0, 10.0, [0.0; 3], 1.0, IDENTITY, "-"),
            "0 10 gps 1 2 3".to_string(),
            line(20.0, 30.0, [0.0; 3], 1.0, IDENTITY, "-"),
        ]
        .join("\n");

        match parse_log(&text, false) {
            Err(LogError::TokenCount { line, found, tokens }) => {
                assert_eq!(line, 2);
                assert_eq!(found, 6);
                assert_eq!(tokens[2], "gps");
            }
            other => panic!("expected token count error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_fields_report_position() {
        let bad_time = line(0.0, 10.0, [0.0; 3], 1.0, IDENTITY, "-").replacen("10", "later", 1);
        let err = parse_log(&bad_time, false).unwrap_err();
        assert!(matches!(err, LogError::InvalidTimestamp { line: 1, field: 1, .. }));

        let bad_number = line(0.0, 10.0, [0.0; 3], 1.0, "1 0 0 0 x 0 0 0 1", "-");
        let err = parse_log(&bad_number, false).unwrap_err();
        assert!(matches!(err, LogError::InvalidNumber { line: 1, field: 11, .. }));
        assert_eq!(err.line(), 1);
    }

    #[test]
    fn test_inverted_window_rejected() {
        let text = line(10.0, 5.0, [0.0; 3], 1.0, IDENTITY, "-");
        assert!(matches!(
            parse_log(&text, false),
            Err(LogError::InvertedWindow { line: 1, .. })
        ));
    }

    #[test]
    fn test_records_after_blank_line_are_kept() {
        let text = format!(
            "{}\n\n   \t\n{}\n",
            line(0.0, 1.0, [0.0, 0.0, 0.0], 1.0, IDENTITY, "-"),
            line(2.0, 3.0, [4.0, 0.0, 0.0], 1.0, IDENTITY, "-"),
        );
        let parsed = parse_log(&text, false).unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[1].position.x, 4.0);
        assert_relative_eq!(seconds_between(epoch(), parsed.history_end.unwrap()), 3.0);
    }

    #[test]
    fn test_error_line_numbers_count_blank_lines() {
        let text = format!("{}\n\nbroken line\n", line(0.0, 1.0, [0.0; 3], 1.0, IDENTITY, "-"));
        let err = parse_log(&text, false).unwrap_err();
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn test_empty_log() {
        let parsed = parse_log("\n\n", false).unwrap();
        assert!(parsed.is_empty());
        assert!(parsed.history_start.is_none());
    }
}

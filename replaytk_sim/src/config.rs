//! Playback configuration.

/// Configuration for a playback run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackConfig {
    /// Frame rate of the playback loop in Hz
    pub frame_rate_hz: f64,

    /// Initial playback speed (negative plays backwards)
    pub speed: f64,

    /// Progress in `[0, 1]` to seek to before playing
    pub start_progress: f64,

    /// Maximum number of frames to play (0 = until playback pauses)
    pub max_frames: u64,

    /// Record every n-th frame when exporting
    pub export_interval: u64,
}

impl PlaybackConfig {
    /// Wall-clock length of one frame.
    pub fn frame_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.frame_rate_hz.max(f64::EPSILON))
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            frame_rate_hz: 30.0,
            speed: 1.0,
            start_progress: 0.0,
            max_frames: 0,
            export_interval: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_frame_duration() {
        let config = PlaybackConfig {
            frame_rate_hz: 4.0,
            ..Default::default()
        };
        assert_eq!(config.frame_duration(), Duration::from_millis(250));
    }
}

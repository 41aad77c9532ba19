//! Playback notifications.
//!
//! Listeners subscribe to an [`EventBus`] and receive every event on their own
//! unbounded channel, in the order the controller emits them.

use crate::loader::ScenarioEvent;
use replaytk_core::Timestamp;
use tokio::sync::mpsc;

/// Something the controller did.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// A simulation finished loading.
    Loaded {
        name: String,
        duration_secs: f64,
        entities: usize,
    },

    /// Executors were updated for a new simulation time.
    Updated {
        time_secs: f64,
        timestamp: Timestamp,
        /// Scenario events whose time fell inside the advanced window
        scenario_events: Vec<ScenarioEvent>,
    },

    PlayRequested,

    PauseRequested,

    /// Playback stopped and the clock was reset.
    Stopped,

    /// The simulation time was set explicitly (seek).
    TimeChanged { time_secs: f64 },
}

impl PlaybackEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PlaybackEvent::Loaded { .. } => "loaded",
            PlaybackEvent::Updated { .. } => "updated",
            PlaybackEvent::PlayRequested => "play-requested",
            PlaybackEvent::PauseRequested => "pause-requested",
            PlaybackEvent::Stopped => "stopped",
            PlaybackEvent::TimeChanged { .. } => "time-changed",
        }
    }
}

/// Fan-out of playback events to any number of subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<PlaybackEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new listener.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<PlaybackEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Delivers `event` to every live subscriber; dropped receivers are pruned.
    pub fn emit(&mut self, event: PlaybackEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

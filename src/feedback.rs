//! Start/success/failure cues. Playing sound is up to the implementor.

use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tone {
    pub frequency_hz: f64,
    pub duration_ms: u64,
}

impl Tone {
    pub const fn new(frequency_hz: f64, duration_ms: u64) -> Self {
        Self {
            frequency_hz,
            duration_ms,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cue {
    Start,
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tones {
    pub start: Tone,
    pub success: Tone,
    pub failure: Tone,
}

impl Default for Tones {
    fn default() -> Self {
        Self {
            start: Tone::new(500.0, 350),
            success: Tone::new(750.0, 350),
            failure: Tone::new(1000.0, 350),
        }
    }
}

impl Tones {
    pub fn for_cue(&self, cue: Cue) -> Tone {
        match cue {
            Cue::Start => self.start,
            Cue::Success => self.success,
            Cue::Failure => self.failure,
        }
    }
}

/// Must not block: it is called from the state machine thread.
pub trait Feedback: Send {
    fn cue(&mut self, cue: Cue, tone: Tone);
}

/// Logs cues instead of playing them.
#[derive(Debug, Default)]
pub struct LogFeedback;

impl Feedback for LogFeedback {
    fn cue(&mut self, cue: Cue, tone: Tone) {
        info!(
            "feedback: {cue:?} ({} Hz, {} ms)",
            tone.frequency_hz, tone.duration_ms
        );
    }
}

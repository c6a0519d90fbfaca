//! Real-time engine for motor-control pointing trials.
//!
//! A trial shows a source region, a destination region, intermediate regions
//! that must be visited and obstacles that must be avoided. The engine
//! samples the pointer on a fixed cadence from a producer thread, hit-tests
//! every sample (including the path from the previous one) on the consumer
//! side, and classifies the trial once it ends.

pub mod clock;
pub mod config;
pub mod error;
pub mod feedback;
pub mod frame;
pub mod geometry;
pub mod input;
pub mod machine;
pub mod pipeline;
pub mod record;
pub mod recorder;
pub mod session;
pub mod state;
pub mod tracker;
pub mod trial;

pub use clock::{Clock, MonotonicClock, SteppedClock};
pub use config::Settings;
pub use error::{Error, Result};
pub use feedback::{Cue, Feedback, LogFeedback, Tone};
pub use frame::{CoordinateFrame, ScreenGeometry, StaticScreen};
pub use geometry::{Circle, HitModel, Rect, Role, Shape};
pub use input::{DeviceEvent, InputSource};
pub use machine::{EngineOptions, Phase, TrialOutcome, TrialStateMachine};
pub use pipeline::{PipelineOptions, SamplingPipeline, Termination, TerminationCause};
pub use record::TrialRecord;
pub use recorder::CsvRecorder;
pub use session::{Recorder, Session, SessionReport};
pub use state::{FailureCause, Sample, TrialState, Verdict};
pub use trial::{TrialConfiguration, TrialOptions, TrialRow};

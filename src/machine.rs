//! Trial lifecycle: Idle -> Tracking -> Stopping -> Completed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::feedback::{Cue, Feedback, Tones};
use crate::geometry::Shape;
use crate::input::InputSource;
use crate::pipeline::{
    Consumer, PipelineOptions, PipelineStats, SamplingPipeline, TabletLatch, Termination,
};
use crate::record::TrialRecord;
use crate::state::{FailureCause, TrialState, Verdict};
use crate::trial::TrialConfiguration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Tracking,
    Stopping,
    Completed,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub pipeline: PipelineOptions,
    pub tones: Tones,
    pub inter_trial_delay: Duration,
    /// Give up waiting in Idle after this long. `None` waits forever.
    pub arm_timeout: Option<Duration>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            pipeline: PipelineOptions::default(),
            tones: Tones::default(),
            inter_trial_delay: Duration::from_millis(1500),
            arm_timeout: None,
        }
    }
}

/// A finished trial, handed to the recorder.
#[derive(Debug, Clone, Serialize)]
pub struct TrialOutcome {
    pub config: TrialConfiguration,
    pub state: TrialState,
    pub termination: Termination,
    pub timed_out: bool,
    pub stats: PipelineStats,
}

impl TrialOutcome {
    pub fn verdict(&self) -> Verdict {
        self.state.verdict()
    }

    pub fn record(&self) -> TrialRecord {
        TrialRecord::build(self)
    }
}

/// A trial times out only when its final elapsed time exceeds the limit.
/// Tracking stops at the limit, so reaching the destination on that exact
/// sample still counts.
pub fn timed_out(config: &TrialConfiguration, termination: &Termination) -> bool {
    termination.elapsed > config.time_limit
}

/// First violated condition wins: timeout, passing the destination, missing
/// it, an unvisited intermediate, a touched obstacle.
pub fn verdict(
    config: &TrialConfiguration,
    state: &TrialState,
    termination: &Termination,
) -> Verdict {
    let cause = if timed_out(config, termination) {
        FailureCause::Timeout
    } else if state.dest_passed() {
        FailureCause::PassedDestination
    } else if !state.dest_hit() {
        FailureCause::MissedDestination
    } else if let Some(index) = state.circles_hit().iter().position(|h| !h) {
        FailureCause::MissedIntermediate { index }
    } else if let Some(index) = state.rects_hit().iter().position(|h| *h) {
        FailureCause::TouchedObstacle { index }
    } else {
        return Verdict::Success;
    };
    Verdict::Failure(cause)
}

pub struct TrialStateMachine {
    clock: Arc<dyn Clock>,
    feedback: Box<dyn Feedback>,
    source: Option<Box<dyn InputSource>>,
    opts: EngineOptions,
    phase: Phase,
    abort: Arc<AtomicBool>,
    completed_at: Option<Duration>,
}

impl TrialStateMachine {
    pub fn new(
        source: Box<dyn InputSource>,
        clock: Arc<dyn Clock>,
        feedback: Box<dyn Feedback>,
        opts: EngineOptions,
    ) -> Self {
        Self {
            clock,
            feedback,
            source: Some(source),
            opts,
            phase: Phase::Idle,
            abort: Arc::new(AtomicBool::new(false)),
            completed_at: None,
        }
    }

    /// Setting the flag makes Idle and the inter-trial delay give up.
    pub fn with_abort(mut self, abort: Arc<AtomicBool>) -> Self {
        self.abort = abort;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    fn enter(&mut self, next: Phase) {
        debug!("trial: {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    /// Runs one trial to completion. The next call first waits out the
    /// inter-trial delay.
    pub fn run_trial(&mut self, config: TrialConfiguration) -> Result<TrialOutcome> {
        self.inter_trial_pause();
        self.enter(Phase::Idle);

        let source = self
            .source
            .as_mut()
            .ok_or_else(|| Error::Input("input source was lost by a failed trial".into()))?;
        source.rearm();
        let (start, latch) = self.wait_for_start(&config)?;

        self.enter(Phase::Tracking);
        info!(
            "trial started: limit {:?}, cadence {:?}, {} intermediates, {} obstacles",
            config.time_limit,
            config.cadence,
            config.circles.len(),
            config.rects.len()
        );
        self.feedback.cue(Cue::Start, self.opts.tones.start);

        let source = self
            .source
            .take()
            .ok_or_else(|| Error::Input("input source was lost by a failed trial".into()))?;
        let mut state = TrialState::new(config.circles.len(), config.rects.len());
        let mut pipe = SamplingPipeline::start(
            source,
            Arc::clone(&self.clock),
            start,
            config.cadence,
            config.time_limit,
            latch,
            self.opts.pipeline,
        )?;

        let mut consumer = Consumer::new(&config, &mut state);
        let terminated = pipe.run_until_terminated(&mut consumer);

        self.enter(Phase::Stopping);
        let (stats, source) = pipe.shutdown(&mut consumer)?;
        self.source = Some(source);
        let termination = terminated?;

        let verdict = verdict(&config, &state, &termination);
        state.finalize(termination.elapsed, verdict);
        let timed_out = timed_out(&config, &termination);
        self.enter(Phase::Completed);
        self.completed_at = Some(self.clock.now());

        if verdict.is_success() {
            self.feedback.cue(Cue::Success, self.opts.tones.success);
        } else {
            self.feedback.cue(Cue::Failure, self.opts.tones.failure);
        }
        info!(
            "trial completed: {:?} after {:?} ({} samples, ended by {:?})",
            verdict,
            termination.elapsed,
            state.samples().len(),
            termination.cause
        );

        Ok(TrialOutcome {
            config,
            state,
            termination,
            timed_out,
            stats,
        })
    }

    fn inter_trial_pause(&mut self) {
        let Some(done) = self.completed_at.take() else {
            return;
        };
        let until = done + self.opts.inter_trial_delay;
        let step = Duration::from_millis(50);
        loop {
            let now = self.clock.now();
            if now >= until || self.aborted() {
                break;
            }
            self.clock.sleep((until - now).min(step));
        }
    }

    /// Polls at the trial cadence until the pointer is inside the source
    /// region. A reported pressure must be positive (pen down).
    fn wait_for_start(&mut self, config: &TrialConfiguration) -> Result<(Duration, TabletLatch)> {
        let armed_at = self.clock.now();
        let mut latch = TabletLatch::default();
        let source_region = Shape::Circle(config.source);

        loop {
            if self.aborted() {
                return Err(Error::NotStarted("aborted while waiting in idle".into()));
            }
            let input = self
                .source
                .as_mut()
                .ok_or_else(|| Error::Input("no input source".into()))?;

            let events = input.device_events();
            latch.observe(&events);
            let (pos, pressure) = match latch.latest {
                Some(ev) => (Some((ev.x, ev.y)), ev.pressure),
                None => (input.cursor(), None),
            };

            if let Some(p) = pos {
                let pen_down = pressure.is_none_or(|v| v > 0.0);
                if pen_down && source_region.contains(p, config.hit_model) {
                    return Ok((self.clock.now(), latch));
                }
            }

            if let Some(limit) = self.opts.arm_timeout {
                if self.clock.elapsed_since(armed_at) >= limit {
                    warn!("pointer never entered the source region within {limit:?}");
                    return Err(Error::NotStarted(format!(
                        "pointer did not enter the source region within {limit:?}"
                    )));
                }
            }
            self.clock.sleep(config.cadence);
        }
    }
}

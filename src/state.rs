//! Per-trial outcome accumulator.
//!
//! Hit flags can only be raised. Samples can only be appended, in strictly
//! increasing elapsed order. Once [`TrialState::finalize`] has run the state
//! refuses every further mutation.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    /// Device pixels.
    pub x: f64,
    pub y: f64,
    pub pressure: Option<f64>,
    pub tilt: Option<(f64, f64)>,
    pub rotation: Option<f64>,
    pub tablet_time_ms: Option<f64>,
    /// Since trial start.
    pub elapsed: Duration,
}

impl Sample {
    pub fn at(x: f64, y: f64, elapsed: Duration) -> Self {
        Self {
            x,
            y,
            pressure: None,
            tilt: None,
            rotation: None,
            tablet_time_ms: None,
            elapsed,
        }
    }

    pub fn pos(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum FailureCause {
    Timeout,
    PassedDestination,
    MissedDestination,
    MissedIntermediate { index: usize },
    TouchedObstacle { index: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    #[default]
    Pending,
    Success,
    Failure(FailureCause),
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success)
    }

    pub fn failure(&self) -> Option<FailureCause> {
        match self {
            Verdict::Failure(c) => Some(*c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("trial state is already finalized")]
    Finalized,
    #[error("sample at {got:?} is not after {last:?}")]
    OutOfOrder { last: Duration, got: Duration },
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialState {
    source_hit: bool,
    dest_hit: bool,
    circles_hit: Vec<bool>,
    rects_hit: Vec<bool>,
    dest_passed: bool,
    samples: Vec<Sample>,
    total_time: Option<Duration>,
    verdict: Verdict,
}

impl TrialState {
    pub fn new(circles: usize, rects: usize) -> Self {
        Self {
            source_hit: false,
            dest_hit: false,
            circles_hit: vec![false; circles],
            rects_hit: vec![false; rects],
            dest_passed: false,
            samples: Vec::new(),
            total_time: None,
            verdict: Verdict::Pending,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.verdict != Verdict::Pending
    }

    pub fn hit_source(&mut self, hit: bool) {
        if !self.is_finalized() {
            self.source_hit |= hit;
        }
    }

    pub fn hit_dest(&mut self, hit: bool) {
        if !self.is_finalized() {
            self.dest_hit |= hit;
        }
    }

    pub fn hit_circle(&mut self, i: usize, hit: bool) {
        if self.is_finalized() {
            return;
        }
        if let Some(f) = self.circles_hit.get_mut(i) {
            *f |= hit;
        }
    }

    pub fn hit_rect(&mut self, i: usize, hit: bool) {
        if self.is_finalized() {
            return;
        }
        if let Some(f) = self.rects_hit.get_mut(i) {
            *f |= hit;
        }
    }

    pub fn mark_dest_passed(&mut self) {
        if !self.is_finalized() {
            self.dest_passed = true;
        }
    }

    pub fn push(&mut self, s: Sample) -> Result<(), StateError> {
        if self.is_finalized() {
            return Err(StateError::Finalized);
        }
        if let Some(last) = self.samples.last() {
            if s.elapsed <= last.elapsed {
                return Err(StateError::OutOfOrder {
                    last: last.elapsed,
                    got: s.elapsed,
                });
            }
        }
        self.samples.push(s);
        Ok(())
    }

    /// Sets the final time and verdict. Only the first call has an effect.
    pub fn finalize(&mut self, total_time: Duration, verdict: Verdict) -> bool {
        if self.is_finalized() || verdict == Verdict::Pending {
            return false;
        }
        self.total_time = Some(total_time);
        self.verdict = verdict;
        true
    }

    pub fn source_hit(&self) -> bool {
        self.source_hit
    }

    pub fn dest_hit(&self) -> bool {
        self.dest_hit
    }

    pub fn circles_hit(&self) -> &[bool] {
        &self.circles_hit
    }

    pub fn rects_hit(&self) -> &[bool] {
        &self.rects_hit
    }

    pub fn dest_passed(&self) -> bool {
        self.dest_passed
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn last_sample(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn total_time(&self) -> Option<Duration> {
        self.total_time
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn flags_only_rise() {
        let mut s = TrialState::new(2, 1);
        s.hit_circle(1, true);
        s.hit_circle(1, false);
        s.hit_rect(0, false);
        s.hit_dest(true);
        s.hit_dest(false);
        assert_eq!(s.circles_hit(), &[false, true]);
        assert_eq!(s.rects_hit(), &[false]);
        assert!(s.dest_hit());
    }

    #[test]
    fn out_of_range_region_index_is_ignored() {
        let mut s = TrialState::new(1, 0);
        s.hit_circle(5, true);
        s.hit_rect(0, true);
        assert_eq!(s.circles_hit(), &[false]);
    }

    #[test]
    fn samples_must_strictly_increase() {
        let mut s = TrialState::new(0, 0);
        s.push(Sample::at(0.0, 0.0, ms(5))).unwrap();
        let err = s.push(Sample::at(1.0, 0.0, ms(5))).unwrap_err();
        assert_eq!(
            err,
            StateError::OutOfOrder {
                last: ms(5),
                got: ms(5)
            }
        );
        assert_eq!(err.to_string(), "sample at 5ms is not after 5ms");
        s.push(Sample::at(1.0, 0.0, ms(10))).unwrap();
        assert_eq!(s.samples().len(), 2);
    }

    #[test]
    fn finalize_happens_once_and_freezes() {
        let mut s = TrialState::new(0, 0);
        assert!(!s.finalize(ms(3), Verdict::Pending));
        assert!(s.finalize(ms(10), Verdict::Success));
        assert!(!s.finalize(ms(20), Verdict::Failure(FailureCause::Timeout)));
        assert_eq!(s.total_time(), Some(ms(10)));
        assert!(s.verdict().is_success());
        assert_eq!(s.push(Sample::at(0.0, 0.0, ms(30))), Err(StateError::Finalized));
        s.hit_source(true);
        assert!(!s.source_hit());
    }
}

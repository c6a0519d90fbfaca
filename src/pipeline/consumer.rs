use std::time::Duration;

use log::warn;
use serde::Serialize;

use crate::geometry::Shape;
use crate::state::{Sample, TrialState};
use crate::trial::TrialConfiguration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationCause {
    Timeout,
    ReachedDestination,
    PassedDestination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Termination {
    pub cause: TerminationCause,
    /// Elapsed time of the sample (or clock check) that ended tracking.
    pub elapsed: Duration,
}

/// Checked after every consumed sample, in this order.
pub fn termination(
    config: &TrialConfiguration,
    state: &TrialState,
    sample: &Sample,
) -> Option<Termination> {
    let cause = if sample.elapsed >= config.time_limit {
        TerminationCause::Timeout
    } else if state.dest_hit() {
        TerminationCause::ReachedDestination
    } else if sample.x >= config.passing_line_px() {
        TerminationCause::PassedDestination
    } else {
        return None;
    };
    Some(Termination {
        cause,
        elapsed: sample.elapsed,
    })
}

/// The only writer of a trial's [`TrialState`].
pub struct Consumer<'a> {
    config: &'a TrialConfiguration,
    state: &'a mut TrialState,
    pub(crate) consumed: usize,
    pub(crate) rejected: usize,
}

impl<'a> Consumer<'a> {
    pub fn new(config: &'a TrialConfiguration, state: &'a mut TrialState) -> Self {
        Self {
            config,
            state,
            consumed: 0,
            rejected: 0,
        }
    }

    /// Hit-tests `sample` against every region using the path from the
    /// previous sample, then appends it. Returns false if it was out of order.
    pub fn absorb(&mut self, sample: Sample) -> bool {
        let prev = self.state.last_sample().copied();
        if let Some(p) = prev {
            if sample.elapsed <= p.elapsed {
                warn!(
                    "dropping out-of-order sample ({:?} after {:?})",
                    sample.elapsed, p.elapsed
                );
                self.rejected += 1;
                return false;
            }
        }

        let cfg = self.config;
        let model = cfg.hit_model;
        let from = prev.map(|p| p.pos());
        let to = sample.pos();

        self.state
            .hit_source(Shape::Circle(cfg.source).hit(from, to, model));
        self.state
            .hit_dest(Shape::Circle(cfg.dest).hit(from, to, model));
        for (i, c) in cfg.circles.iter().enumerate() {
            self.state.hit_circle(i, Shape::Circle(*c).hit(from, to, model));
        }
        for (i, r) in cfg.rects.iter().enumerate() {
            self.state.hit_rect(i, Shape::Rect(*r).hit(from, to, model));
        }

        if self.state.push(sample).is_err() {
            self.rejected += 1;
            return false;
        }
        self.consumed += 1;
        true
    }

    pub fn consume(&mut self, sample: Sample) -> Option<Termination> {
        if !self.absorb(sample) {
            return None;
        }
        let t = termination(self.config, &*self.state, &sample);
        if let Some(Termination {
            cause: TerminationCause::PassedDestination,
            ..
        }) = t
        {
            self.state.mark_dest_passed();
        }
        t
    }
}

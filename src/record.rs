//! Tabular record of a finished trial.
//!
//! One row per sample. Trial-level columns are filled on the first row only;
//! a trial without samples gets a single row holding just those.
//! Positions are in centimeters, times in milliseconds.

use serde::Serialize;

use crate::machine::TrialOutcome;
use crate::pipeline::{PipelineStats, TerminationCause};
use crate::state::{FailureCause, Sample};

const SAMPLE_COLUMNS: [&str; 8] = [
    "x",
    "y",
    "pressure",
    "x_tilt",
    "y_tilt",
    "rotation",
    "tablet_time",
    "time",
];

const TRIAL_COLUMNS: [&str; 6] = [
    "total_time",
    "success",
    "timeout",
    "dest_passed",
    "source_hit",
    "dest_hit",
];

/// Column names for a trial with `circles` intermediates and `rects` obstacles.
pub fn header(circles: usize, rects: usize) -> Vec<String> {
    let mut h: Vec<String> = SAMPLE_COLUMNS
        .iter()
        .chain(TRIAL_COLUMNS.iter())
        .map(|s| s.to_string())
        .collect();
    h.extend((1..=circles).map(|i| format!("circle_{i}_hit")));
    h.extend((1..=rects).map(|i| format!("rect_{i}_hit")));
    h.push("distance_to_dest_center".into());
    h
}

fn flag(b: bool) -> String {
    if b { "1".into() } else { "0".into() }
}

fn opt(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

fn ms(d: std::time::Duration) -> f64 {
    d.as_nanos() as f64 / 1e6
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialSummary {
    pub success: bool,
    pub failure: Option<FailureCause>,
    pub ended_by: TerminationCause,
    pub total_time_ms: f64,
    pub timeout: bool,
    pub dest_passed: bool,
    pub source_hit: bool,
    pub dest_hit: bool,
    pub circles_hit: Vec<bool>,
    pub rects_hit: Vec<bool>,
    pub samples: usize,
    pub pipeline: PipelineStats,
}

#[derive(Debug, Clone)]
pub struct TrialRecord {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Milliseconds between consecutive samples.
    pub intervals_ms: Vec<f64>,
    pub summary: TrialSummary,
}

impl TrialRecord {
    pub fn build(outcome: &TrialOutcome) -> Self {
        let cfg = &outcome.config;
        let state = &outcome.state;
        let frame = &cfg.frame;
        let total = state.total_time().unwrap_or(outcome.termination.elapsed);
        let verdict = state.verdict();
        let dest = frame.to_physical(cfg.dest.x, cfg.dest.y);

        let trial_fields = || {
            let mut f = vec![
                ms(total).to_string(),
                flag(verdict.is_success()),
                flag(outcome.timed_out),
                flag(state.dest_passed()),
                flag(state.source_hit()),
                flag(state.dest_hit()),
            ];
            f.extend(state.circles_hit().iter().map(|h| flag(*h)));
            f.extend(state.rects_hit().iter().map(|h| flag(*h)));
            f
        };
        let blank = TRIAL_COLUMNS.len() + cfg.circles.len() + cfg.rects.len();

        let mut rows: Vec<Vec<String>> = state
            .samples()
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let (x, y) = frame.to_physical(s.x, s.y);
                let mut row = sample_fields(s, x, y);
                if i == 0 {
                    row.extend(trial_fields());
                } else {
                    row.extend(std::iter::repeat_n(String::new(), blank));
                }
                row.push((x - dest.0).hypot(y - dest.1).to_string());
                row
            })
            .collect();
        if rows.is_empty() {
            let mut row = vec![String::new(); SAMPLE_COLUMNS.len()];
            row.extend(trial_fields());
            row.push(String::new());
            rows.push(row);
        }

        let intervals_ms = state
            .samples()
            .windows(2)
            .map(|w| ms(w[1].elapsed - w[0].elapsed))
            .collect();

        let summary = TrialSummary {
            success: verdict.is_success(),
            failure: verdict.failure(),
            ended_by: outcome.termination.cause,
            total_time_ms: ms(total),
            timeout: outcome.timed_out,
            dest_passed: state.dest_passed(),
            source_hit: state.source_hit(),
            dest_hit: state.dest_hit(),
            circles_hit: state.circles_hit().to_vec(),
            rects_hit: state.rects_hit().to_vec(),
            samples: state.samples().len(),
            pipeline: outcome.stats,
        };

        Self {
            header: header(cfg.circles.len(), cfg.rects.len()),
            rows,
            intervals_ms,
            summary,
        }
    }
}

fn sample_fields(s: &Sample, x: f64, y: f64) -> Vec<String> {
    vec![
        x.to_string(),
        y.to_string(),
        opt(s.pressure),
        opt(s.tilt.map(|t| t.0)),
        opt(s.tilt.map(|t| t.1)),
        opt(s.rotation),
        opt(s.tablet_time_ms),
        ms(s.elapsed).to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::frame::{CoordinateFrame, StaticScreen};
    use crate::pipeline::Termination;
    use crate::state::{TrialState, Verdict};
    use crate::trial::{TrialConfiguration, TrialOptions};

    fn outcome() -> TrialOutcome {
        let s = StaticScreen {
            width_px: 1000,
            height_px: 800,
            width_mm: 500.0,
            height_mm: 400.0,
        };
        let frame = CoordinateFrame::new(&s, (5.0, 20.0)).unwrap();
        let data = [
            2000.0, 5.0, 0.0, 0.0, 1.0, 10.0, 0.0, 1.0, 1.0, 5.0, 0.0, 0.5, 0.0,
        ];
        let config =
            TrialConfiguration::from_fields(&data, false, frame, TrialOptions::default()).unwrap();
        let mut state = TrialState::new(1, 0);
        state.hit_source(true);
        state.hit_dest(true);
        state
            .push(Sample::at(100.0, 400.0, Duration::from_millis(5)))
            .unwrap();
        state
            .push(Sample::at(300.0, 400.0, Duration::from_millis(12)))
            .unwrap();
        let verdict = Verdict::Failure(FailureCause::MissedIntermediate { index: 0 });
        state.finalize(Duration::from_millis(12), verdict);
        TrialOutcome {
            config,
            state,
            termination: Termination {
                cause: TerminationCause::ReachedDestination,
                elapsed: Duration::from_millis(12),
            },
            timed_out: false,
            stats: PipelineStats::default(),
        }
    }

    #[test]
    fn header_follows_region_counts() {
        let h = header(2, 1);
        assert_eq!(h[0], "x");
        assert_eq!(h[8], "total_time");
        assert_eq!(h[14], "circle_1_hit");
        assert_eq!(h[15], "circle_2_hit");
        assert_eq!(h[16], "rect_1_hit");
        assert_eq!(h.last().unwrap(), "distance_to_dest_center");
        assert_eq!(h.len(), 18);
    }

    #[test]
    fn trial_fields_only_on_first_row() {
        let rec = outcome().record();
        assert_eq!(rec.rows.len(), 2);
        assert!(rec.rows.iter().all(|r| r.len() == rec.header.len()));

        let first = &rec.rows[0];
        assert_eq!(first[0], "0");
        assert_eq!(first[1], "0");
        assert_eq!(first[7], "5");
        assert_eq!(first[8], "12");
        assert_eq!(first[9], "0");
        assert_eq!(first[13], "1");
        assert_eq!(first[14], "0");
        assert_eq!(first[15], "10");

        let second = &rec.rows[1];
        assert!(second[8..15].iter().all(|c| c.is_empty()));
        assert_eq!(second[15], "0");
    }

    #[test]
    fn trial_without_samples_keeps_its_outcome_row() {
        let mut out = outcome();
        let mut state = TrialState::new(1, 0);
        state.finalize(
            Duration::from_millis(2005),
            Verdict::Failure(FailureCause::Timeout),
        );
        out.state = state;
        out.termination = Termination {
            cause: TerminationCause::Timeout,
            elapsed: Duration::from_millis(2005),
        };
        out.timed_out = true;

        let rec = out.record();
        assert_eq!(rec.rows.len(), 1);
        let row = &rec.rows[0];
        assert_eq!(row.len(), rec.header.len());
        assert!(row[..8].iter().all(|c| c.is_empty()));
        assert_eq!(row[8], "2005");
        assert_eq!(row[9], "0");
        assert_eq!(row[10], "1");
        assert!(row[15].is_empty());
        assert!(rec.intervals_ms.is_empty());
    }

    #[test]
    fn intervals_and_summary() {
        let rec = outcome().record();
        assert_eq!(rec.intervals_ms, vec![7.0]);
        assert!(!rec.summary.success);
        assert_eq!(
            rec.summary.failure,
            Some(FailureCause::MissedIntermediate { index: 0 })
        );
        assert_eq!(rec.summary.samples, 2);
    }
}

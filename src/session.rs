//! Runs a list of trial rows through one engine.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info, warn};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::frame::CoordinateFrame;
use crate::machine::{TrialOutcome, TrialStateMachine};
use crate::trial::{TrialConfiguration, TrialOptions};

/// Receives each completed trial. `index` is the row's position in the input.
pub trait Recorder {
    fn record(&mut self, index: usize, outcome: &TrialOutcome) -> Result<()>;
}

/// A row that failed to parse as numbers still occupies its index.
pub type RowFields = std::result::Result<Vec<f64>, String>;

/// Reads headerless numeric rows. Blank cells are ignored so trailing commas
/// are harmless.
pub fn read_rows_from<R: Read>(reader: R) -> Result<Vec<RowFields>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let parsed: RowFields = record
            .iter()
            .filter(|cell| !cell.is_empty())
            .map(|cell| {
                cell.parse::<f64>()
                    .map_err(|_| format!("'{cell}' is not a number"))
            })
            .collect();
        rows.push(parsed);
    }
    Ok(rows)
}

pub fn read_rows(path: &Path) -> Result<Vec<RowFields>> {
    let file = File::open(path)
        .map_err(|e| Error::config(format!("failed to open {}: {e}", path.display())))?;
    read_rows_from(file)
}

/// Builds every row into a configuration, keeping failures per row.
pub fn build_all(
    rows: &[RowFields],
    rect_velocity: bool,
    frame: CoordinateFrame,
    opts: TrialOptions,
) -> Vec<Result<TrialConfiguration>> {
    rows.iter()
        .map(|row| {
            let fields = row.as_ref().map_err(|e| Error::config(e.clone()))?;
            TrialConfiguration::from_fields(fields, rect_velocity, frame, opts)
        })
        .collect()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionReport {
    pub completed: usize,
    pub succeeded: usize,
    /// Rows that could not be built or never started.
    pub skipped: Vec<usize>,
    pub aborted: bool,
}

pub struct Session<'a> {
    pub machine: &'a mut TrialStateMachine,
    pub frame: CoordinateFrame,
    pub options: TrialOptions,
    pub rect_velocity: bool,
    pub abort: Arc<AtomicBool>,
}

impl Session<'_> {
    /// Runs rows from `start` onward, handing each finished trial to
    /// `recorder`. Malformed rows are logged and skipped.
    pub fn run(
        &mut self,
        rows: &[RowFields],
        start: usize,
        recorder: &mut dyn Recorder,
    ) -> Result<SessionReport> {
        let mut report = SessionReport::default();
        if start > 0 && start >= rows.len() {
            warn!("start index {start} is past the last of {} rows", rows.len());
        }

        let configs = build_all(rows, self.rect_velocity, self.frame, self.options);
        for (index, config) in configs.into_iter().enumerate().skip(start) {
            if self.abort.load(Ordering::Relaxed) {
                report.aborted = true;
                break;
            }
            let config = match config {
                Ok(c) => c,
                Err(e) => {
                    error!("row {index}: {e}; skipped");
                    report.skipped.push(index);
                    continue;
                }
            };

            info!("trial {index}: waiting for the pointer in the source region");
            let outcome = match self.machine.run_trial(config) {
                Ok(o) => o,
                Err(Error::NotStarted(why)) => {
                    if self.abort.load(Ordering::Relaxed) {
                        report.aborted = true;
                        break;
                    }
                    warn!("trial {index} not started: {why}");
                    report.skipped.push(index);
                    continue;
                }
                Err(e) => return Err(e),
            };

            report.completed += 1;
            if outcome.verdict().is_success() {
                report.succeeded += 1;
            }
            recorder.record(index, &outcome)?;
        }

        info!(
            "session finished: {} completed, {} succeeded, {} skipped{}",
            report.completed,
            report.succeeded,
            report.skipped.len(),
            if report.aborted { ", aborted" } else { "" }
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_read_headerless_and_flexible() {
        let text = "2000, 5, 0,0,1, 10,0,1, 0, 0,\n1000,5,0,0,1,10,0,1,0,0\nabc,1\n";
        let rows = read_rows_from(text.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].as_ref().unwrap().len(), 10);
        assert_eq!(rows[1].as_ref().unwrap()[0], 1000.0);
        assert!(rows[2].is_err());
    }

    #[test]
    fn build_all_keeps_row_positions() {
        use crate::frame::StaticScreen;
        let s = StaticScreen {
            width_px: 1000,
            height_px: 800,
            width_mm: 500.0,
            height_mm: 400.0,
        };
        let frame = CoordinateFrame::new(&s, (5.0, 20.0)).unwrap();
        let rows = vec![
            Err("bad".to_string()),
            Ok(vec![2000.0, 5.0, 0.0, 0.0, 1.0, 10.0, 0.0, 1.0, 0.0, 0.0]),
            Ok(vec![2000.0, 5.0, 0.0]),
        ];
        let built = build_all(&rows, false, frame, TrialOptions::default());
        assert!(matches!(built[0], Err(Error::Configuration(_))));
        assert!(built[1].is_ok());
        assert!(built[2].is_err());
    }
}

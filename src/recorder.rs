//! Writes finished trials into an output directory.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::error::Result;
use crate::machine::TrialOutcome;
use crate::record::TrialSummary;
use crate::session::Recorder;

/// `<n>.csv` holds the record, `<n>_diffs.txt` the sample intervals and
/// `<n>_summary.json` the verdict.
#[derive(Debug)]
pub struct CsvRecorder {
    dir: PathBuf,
}

impl CsvRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Recorder for CsvRecorder {
    fn record(&mut self, index: usize, outcome: &TrialOutcome) -> Result<()> {
        let record = outcome.record();

        let csv_path = self.dir.join(format!("{index}.csv"));
        let mut w = csv::Writer::from_path(&csv_path)?;
        w.write_record(&record.header)?;
        for row in &record.rows {
            w.write_record(row)?;
        }
        w.flush()?;

        let mut diffs = BufWriter::new(File::create(self.dir.join(format!("{index}_diffs.txt")))?);
        for d in &record.intervals_ms {
            writeln!(diffs, "{d}")?;
        }
        diffs.flush()?;

        let summary = File::create(self.dir.join(format!("{index}_summary.json")))?;
        write_summary(summary, &record.summary)?;

        info!("trial {index} saved to {}", csv_path.display());
        Ok(())
    }
}

fn write_summary(out: impl Write, summary: &TrialSummary) -> Result<()> {
    let mut w = BufWriter::new(out);
    serde_json::to_writer_pretty(&mut w, summary)?;
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::frame::{CoordinateFrame, StaticScreen};
    use crate::pipeline::{PipelineStats, Termination, TerminationCause};
    use crate::state::{Sample, TrialState, Verdict};
    use crate::trial::{TrialConfiguration, TrialOptions};

    fn outcome() -> TrialOutcome {
        let s = StaticScreen {
            width_px: 1000,
            height_px: 800,
            width_mm: 500.0,
            height_mm: 400.0,
        };
        let frame = CoordinateFrame::new(&s, (5.0, 20.0)).unwrap();
        let data = [2000.0, 5.0, 0.0, 0.0, 1.0, 10.0, 0.0, 1.0, 0.0, 0.0];
        let config =
            TrialConfiguration::from_fields(&data, false, frame, TrialOptions::default()).unwrap();
        let mut state = TrialState::new(0, 0);
        state.hit_source(true);
        state.hit_dest(true);
        for (i, x) in [100.0, 200.0, 300.0].into_iter().enumerate() {
            let t = Duration::from_millis(5 * (i as u64 + 1));
            state.push(Sample::at(x, 400.0, t)).unwrap();
        }
        state.finalize(Duration::from_millis(15), Verdict::Success);
        TrialOutcome {
            config,
            state,
            termination: Termination {
                cause: TerminationCause::ReachedDestination,
                elapsed: Duration::from_millis(15),
            },
            timed_out: false,
            stats: PipelineStats::default(),
        }
    }

    #[test]
    fn writes_three_files_per_trial() {
        let outcome = outcome();
        let dir = std::env::temp_dir().join(format!("tracetrial-rec-{}", std::process::id()));
        let mut rec = CsvRecorder::new(&dir).unwrap();
        rec.record(7, &outcome).unwrap();

        let csv_text = fs::read_to_string(dir.join("7.csv")).unwrap();
        let mut lines = csv_text.lines();
        assert!(lines.next().unwrap().starts_with("x,y,pressure"));
        assert_eq!(lines.count(), 3);

        let diffs = fs::read_to_string(dir.join("7_diffs.txt")).unwrap();
        assert_eq!(diffs.lines().collect::<Vec<_>>(), vec!["5", "5"]);

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("7_summary.json")).unwrap())
                .unwrap();
        assert_eq!(summary["success"], true);
        assert_eq!(summary["samples"], 3);

        fs::remove_dir_all(&dir).unwrap();
    }

    /// Accepts nothing, like a full disk.
    struct Full;

    impl Write for Full {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("no space"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn summary_write_failure_is_reported() {
        let summary = outcome().record().summary;
        let err = write_summary(Full, &summary).unwrap_err();
        assert!(matches!(err, crate::Error::Io(_)), "{err}");
    }
}

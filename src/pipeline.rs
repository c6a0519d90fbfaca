//! Producer/consumer sampling for one trial.
//!
//! The producer thread owns the input source and feeds a bounded queue. The
//! consumer runs on the caller's thread and is the only writer of the trial
//! state. The queue and one stop flag are all the two sides share.

mod consumer;
mod producer;

pub use consumer::{Consumer, Termination, TerminationCause, termination};
pub use producer::TabletLatch;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::input::InputSource;
use crate::state::Sample;
use producer::{Producer, ProducerReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub queue_capacity: usize,
    /// Queued samples still processed after tracking ends.
    pub final_drain_max: usize,
    /// Enqueue every device event instead of the latest one per tick.
    pub immediate_device_samples: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            final_drain_max: 256,
            immediate_device_samples: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub produced: usize,
    pub consumed: usize,
    pub drained: usize,
    /// Left in the queue after the bounded drain.
    pub discarded: usize,
    pub rejected: usize,
    pub peak_depth: usize,
    pub tablet_seen: bool,
}

pub struct SamplingPipeline {
    rx: Receiver<Sample>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<ProducerReport>>,
    clock: Arc<dyn Clock>,
    start: Duration,
    cadence: Duration,
    time_limit: Duration,
    opts: PipelineOptions,
}

impl SamplingPipeline {
    /// Spawns the producer. `start` is the clock reading that elapsed times
    /// are measured from.
    pub fn start(
        source: Box<dyn InputSource>,
        clock: Arc<dyn Clock>,
        start: Duration,
        cadence: Duration,
        time_limit: Duration,
        latch: TabletLatch,
        opts: PipelineOptions,
    ) -> Result<Self> {
        if opts.queue_capacity == 0 {
            return Err(Error::config("queue capacity must be positive"));
        }
        let (tx, rx) = bounded(opts.queue_capacity);
        let stop = Arc::new(AtomicBool::new(false));
        let producer = Producer {
            source,
            clock: Arc::clone(&clock),
            start,
            cadence,
            immediate_device_samples: opts.immediate_device_samples,
            latch,
            tx,
            stop: Arc::clone(&stop),
        };
        let handle = thread::Builder::new()
            .name("trial-producer".into())
            .spawn(move || producer.run())?;

        Ok(Self {
            rx,
            stop,
            handle: Some(handle),
            clock,
            start,
            cadence,
            time_limit,
            opts,
        })
    }

    /// Feeds queued samples to `consumer` until the termination predicate
    /// fires. An empty queue is waited on for at most one cadence interval,
    /// after which the clock itself is checked against the time limit.
    pub fn run_until_terminated(&mut self, consumer: &mut Consumer<'_>) -> Result<Termination> {
        loop {
            match self.rx.recv_timeout(self.cadence) {
                Ok(sample) => {
                    if let Some(t) = consumer.consume(sample) {
                        return Ok(t);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let now = self.clock.elapsed_since(self.start);
                    if now >= self.time_limit {
                        return Ok(Termination {
                            cause: TerminationCause::Timeout,
                            elapsed: now,
                        });
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Pipeline("producer exited while tracking".into()));
                }
            }
        }
    }

    /// Stops and joins the producer, then drains at most `final_drain_max`
    /// queued samples into `consumer`. Returns the input source for the next
    /// trial.
    pub fn shutdown(
        mut self,
        consumer: &mut Consumer<'_>,
    ) -> Result<(PipelineStats, Box<dyn InputSource>)> {
        self.stop.store(true, Ordering::Release);
        let report = self
            .handle
            .take()
            .ok_or_else(|| Error::Pipeline("producer already joined".into()))?
            .join()
            .map_err(|_| Error::Pipeline("producer thread panicked".into()))?;

        let consumed = consumer.consumed;
        let mut drained = 0;
        for sample in self.rx.try_iter().take(self.opts.final_drain_max) {
            if consumer.absorb(sample) {
                drained += 1;
            }
        }
        let discarded = self.rx.try_iter().count();

        let stats = PipelineStats {
            produced: report.produced,
            consumed,
            drained,
            discarded,
            rejected: consumer.rejected,
            peak_depth: report.peak_depth,
            tablet_seen: report.tablet_seen,
        };
        debug!("pipeline: {stats:?}");
        Ok((stats, report.source))
    }
}

impl Drop for SamplingPipeline {
    fn drop(&mut self) {
        // error paths still must not leave the producer running
        self.stop.store(true, Ordering::Release);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SteppedClock;
    use crate::frame::{CoordinateFrame, StaticScreen};
    use crate::input::DeviceEvent;
    use crate::state::TrialState;
    use crate::trial::{TrialConfiguration, TrialOptions};

    /// Cursor moving right by `step` pixels per poll.
    struct Sweep {
        x: f64,
        step: f64,
    }

    impl InputSource for Sweep {
        fn cursor(&mut self) -> Option<(f64, f64)> {
            self.x += self.step;
            Some((self.x, 400.0))
        }

        fn device_events(&mut self) -> Vec<DeviceEvent> {
            vec![]
        }
    }

    /// Reports a tablet event on every call after the first `quiet` calls.
    struct LateTablet {
        calls: usize,
        quiet: usize,
    }

    impl InputSource for LateTablet {
        fn cursor(&mut self) -> Option<(f64, f64)> {
            Some((0.0, 0.0))
        }

        fn device_events(&mut self) -> Vec<DeviceEvent> {
            self.calls += 1;
            if self.calls <= self.quiet {
                return vec![];
            }
            vec![DeviceEvent {
                x: 50.0,
                y: 60.0,
                pressure: Some(0.5),
                ..Default::default()
            }]
        }
    }

    /// Reports three pen events, left to right, on every poll.
    struct Burst;

    impl InputSource for Burst {
        fn cursor(&mut self) -> Option<(f64, f64)> {
            None
        }

        fn device_events(&mut self) -> Vec<DeviceEvent> {
            [110.0, 120.0, 130.0]
                .into_iter()
                .map(|x| DeviceEvent {
                    x,
                    y: 400.0,
                    pressure: Some(0.5),
                    ..Default::default()
                })
                .collect()
        }
    }

    fn config(limit_ms: f64) -> TrialConfiguration {
        let s = StaticScreen {
            width_px: 1000,
            height_px: 800,
            width_mm: 500.0,
            height_mm: 400.0,
        };
        let frame = CoordinateFrame::new(&s, (5.0, 20.0)).unwrap();
        let data = [limit_ms, 5.0, 0.0, 0.0, 1.0, 10.0, 0.0, 1.0, 0.0, 0.0];
        TrialConfiguration::from_fields(&data, false, frame, TrialOptions::default()).unwrap()
    }

    fn run(
        cfg: &TrialConfiguration,
        source: Box<dyn InputSource>,
        opts: PipelineOptions,
    ) -> (TrialState, Termination, PipelineStats) {
        let clock: Arc<dyn Clock> = Arc::new(SteppedClock::new());
        let mut state = TrialState::new(0, 0);
        let mut pipe = SamplingPipeline::start(
            source,
            Arc::clone(&clock),
            clock.now(),
            cfg.cadence,
            cfg.time_limit,
            TabletLatch::default(),
            opts,
        )
        .unwrap();
        let mut consumer = Consumer::new(cfg, &mut state);
        let t = pipe.run_until_terminated(&mut consumer).unwrap();
        let (stats, _source) = pipe.shutdown(&mut consumer).unwrap();
        (state, t, stats)
    }

    #[test]
    fn samples_arrive_in_order_on_the_cadence() {
        let cfg = config(100.0);
        let (state, t, stats) = run(
            &cfg,
            Box::new(Sweep { x: 0.0, step: 0.0 }),
            PipelineOptions::default(),
        );
        assert_eq!(t.cause, TerminationCause::Timeout);
        let times: Vec<_> = state.samples().iter().map(|s| s.elapsed).collect();
        assert_eq!(times[0], Duration::from_millis(5));
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert!(t.elapsed >= Duration::from_millis(100));
        assert_eq!(stats.consumed + stats.drained, state.samples().len());
    }

    #[test]
    fn reaching_destination_stops_the_producer() {
        let cfg = config(2000.0);
        let (state, t, stats) = run(
            &cfg,
            Box::new(Sweep { x: 100.0, step: 4.0 }),
            PipelineOptions::default(),
        );
        assert_eq!(t.cause, TerminationCause::ReachedDestination);
        assert!(state.dest_hit());
        assert!(stats.produced >= stats.consumed);
    }

    #[test]
    fn final_drain_is_bounded() {
        let cfg = config(50.0);
        let opts = PipelineOptions {
            final_drain_max: 0,
            ..Default::default()
        };
        let (state, _, stats) = run(&cfg, Box::new(Sweep { x: 0.0, step: 0.0 }), opts);
        assert_eq!(stats.drained, 0);
        assert_eq!(state.samples().len(), stats.consumed);
        assert_eq!(stats.produced, stats.consumed + stats.discarded);
    }

    #[test]
    fn tiny_queue_applies_backpressure_without_losing_samples() {
        let cfg = config(200.0);
        let opts = PipelineOptions {
            queue_capacity: 1,
            final_drain_max: 1_000,
            ..Default::default()
        };
        let (state, _, stats) = run(&cfg, Box::new(Sweep { x: 0.0, step: 0.0 }), opts);
        assert_eq!(stats.discarded, 0);
        assert_eq!(stats.produced, state.samples().len());
        assert!(stats.peak_depth <= 1);
    }

    #[test]
    fn tablet_latch_prefers_device_events() {
        let cfg = config(100.0);
        let (state, _, stats) = run(
            &cfg,
            Box::new(LateTablet { calls: 0, quiet: 3 }),
            PipelineOptions::default(),
        );
        assert!(stats.tablet_seen);
        let s = state.samples();
        assert_eq!(s[0].pos(), (0.0, 0.0));
        assert_eq!(s[3].pos(), (50.0, 60.0));
        assert_eq!(s[3].pressure, Some(0.5));
        assert!(s[3..].iter().all(|x| x.pressure == Some(0.5)));
    }

    #[test]
    fn immediate_mode_keeps_every_device_event() {
        let cfg = config(50.0);
        let opts = PipelineOptions {
            immediate_device_samples: true,
            final_drain_max: 1_000,
            ..Default::default()
        };
        let (state, _, stats) = run(&cfg, Box::new(Burst), opts);
        let s = state.samples();

        assert!(stats.tablet_seen);
        assert_eq!(stats.produced, s.len());
        assert_eq!(s.len() % 3, 0);
        assert!(s.len() >= 30);
        assert!(s.windows(2).all(|w| w[0].elapsed < w[1].elapsed));
        for (i, sample) in s.iter().enumerate() {
            assert_eq!(sample.x, 110.0 + 10.0 * (i % 3) as f64);
        }
        // events of one poll share its tick
        for tick in s.chunks(3) {
            assert_eq!(tick[2].elapsed - tick[0].elapsed, Duration::from_nanos(2));
        }
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let clock: Arc<dyn Clock> = Arc::new(SteppedClock::new());
        let opts = PipelineOptions {
            queue_capacity: 0,
            ..Default::default()
        };
        let r = SamplingPipeline::start(
            Box::new(Sweep { x: 0.0, step: 0.0 }),
            clock,
            Duration::ZERO,
            Duration::from_millis(5),
            Duration::from_millis(10),
            TabletLatch::default(),
            opts,
        );
        assert!(r.is_err());
    }
}

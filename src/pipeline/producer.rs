use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{SendTimeoutError, Sender};
use log::debug;

use crate::clock::Clock;
use crate::input::{DeviceEvent, InputSource};
use crate::state::Sample;

/// How long a blocked push waits before re-checking the stop flag.
const BLOCKED_RECHECK: Duration = Duration::from_millis(2);

/// Device state carried over from Idle into the producer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TabletLatch {
    pub seen: bool,
    pub latest: Option<DeviceEvent>,
}

impl TabletLatch {
    pub fn observe(&mut self, events: &[DeviceEvent]) {
        if let Some(ev) = events.last() {
            self.seen = true;
            self.latest = Some(*ev);
        }
    }
}

pub(crate) struct ProducerReport {
    pub source: Box<dyn InputSource>,
    pub produced: usize,
    pub peak_depth: usize,
    pub tablet_seen: bool,
}

pub(crate) struct Producer {
    pub source: Box<dyn InputSource>,
    pub clock: Arc<dyn Clock>,
    pub start: Duration,
    pub cadence: Duration,
    pub immediate_device_samples: bool,
    pub latch: TabletLatch,
    pub tx: Sender<Sample>,
    pub stop: Arc<AtomicBool>,
}

fn from_event(ev: &DeviceEvent, elapsed: Duration) -> Sample {
    Sample {
        x: ev.x,
        y: ev.y,
        pressure: ev.pressure,
        tilt: ev.tilt,
        rotation: ev.rotation,
        tablet_time_ms: ev.timestamp_ms,
        elapsed,
    }
}

impl Producer {
    pub fn run(mut self) -> ProducerReport {
        let mut produced = 0usize;
        let mut peak_depth = 0usize;
        let mut last: Option<Duration> = None;
        let mut next_tick = self.start + self.cadence;

        'ticks: loop {
            if self.stopped() {
                break;
            }
            let wait = next_tick.saturating_sub(self.clock.now());
            self.clock.sleep(wait);
            next_tick += self.cadence;
            if self.stopped() {
                break;
            }

            let events = self.source.device_events();
            if !events.is_empty() && !self.latch.seen {
                debug!("producer: tablet seen, preferring device events");
            }
            self.latch.observe(&events);

            let mut batch = Vec::new();
            if self.immediate_device_samples && !events.is_empty() {
                batch.extend(events.iter().map(|ev| (Some(*ev), None)));
            } else if self.latch.seen {
                batch.push((self.latch.latest, None));
            } else if let Some(p) = self.source.cursor() {
                batch.push((None, Some(p)));
            }

            for (ev, cursor) in batch {
                let elapsed = self.next_elapsed(&mut last);
                let sample = match (ev, cursor) {
                    (Some(ev), _) => from_event(&ev, elapsed),
                    (None, Some((x, y))) => Sample::at(x, y, elapsed),
                    (None, None) => continue,
                };
                if !self.push(sample) {
                    break 'ticks;
                }
                produced += 1;
                peak_depth = peak_depth.max(self.tx.len());
            }
        }

        ProducerReport {
            source: self.source,
            produced,
            peak_depth,
            tablet_seen: self.latch.seen,
        }
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Elapsed time for the next sample, bumped if the clock did not move.
    fn next_elapsed(&self, last: &mut Option<Duration>) -> Duration {
        let mut t = self.clock.elapsed_since(self.start);
        if let Some(prev) = *last {
            if t <= prev {
                t = prev + Duration::from_nanos(1);
            }
        }
        *last = Some(t);
        t
    }

    /// Blocks while the queue is full. Gives up only when stopped or when the
    /// consumer is gone.
    fn push(&self, mut sample: Sample) -> bool {
        loop {
            match self.tx.send_timeout(sample, BLOCKED_RECHECK) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(back)) => {
                    if self.stopped() {
                        return false;
                    }
                    sample = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }
}

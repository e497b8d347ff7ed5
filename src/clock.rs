//! Clock sources and the session loop that feeds them into a [`Scheduler`].
//!
//! ```text
//! native player ──push──┐
//!                       ├──► channel ──► drive() ──► Scheduler ──► Renderer
//! position poll ──timer─┘
//! ```
//!
//! Both sources deliver plain `f64` seconds through a crossbeam channel, so
//! the scheduler never knows which one is active. Exactly one source feeds a
//! session; samples are processed in arrival order on the thread calling
//! [`drive`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, info};

use crate::scheduler::{Activation, CommentHandle, Scheduler};

/// Stream of playback positions in seconds.
pub(crate) trait ClockSource {
    fn samples(&self) -> &Receiver<f64>;

    /// Stops producing samples; the sample channel then disconnects.
    fn stop(&mut self);
}

/// Read access to a player's current position; `None` once playback ended.
pub(crate) trait PlaybackPosition: Send + Sync {
    fn position_secs(&self) -> Option<f64>;
}

/// Consumer of scheduler transitions. Visual lifetime belongs to the
/// renderer; it reports comments it finished showing through `finished`.
pub(crate) trait Renderer {
    fn activate(&mut self, activation: Activation);

    fn expire(&mut self, handle: CommentHandle);

    fn finished(&mut self) -> Vec<CommentHandle> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Push source
// ---------------------------------------------------------------------------

/// Sending half handed to the native playback layer.
#[derive(Debug)]
pub(crate) struct ClockPublisher {
    tx: Sender<f64>,
}

impl ClockPublisher {
    /// Returns `false` once the session is gone.
    pub(crate) fn publish(&self, secs: f64) -> bool {
        self.tx.send(secs).is_ok()
    }
}

#[derive(Debug)]
pub(crate) struct PushClock {
    rx: Receiver<f64>,
}

pub(crate) fn push_clock() -> (ClockPublisher, PushClock) {
    let (tx, rx) = channel::unbounded();
    (ClockPublisher { tx }, PushClock { rx })
}

impl ClockSource for PushClock {
    fn samples(&self) -> &Receiver<f64> {
        &self.rx
    }

    /// Discards buffered samples and detaches the publisher, whose next
    /// `publish` reports the session as gone.
    fn stop(&mut self) {
        let (_, closed) = channel::unbounded();
        self.rx = closed;
    }
}

// ---------------------------------------------------------------------------
// Polled source
// ---------------------------------------------------------------------------

/// Fallback source sampling a [`PlaybackPosition`] on a fixed interval from a
/// background thread. The timer stops on [`ClockSource::stop`] or drop.
pub(crate) struct PolledClock {
    rx: Receiver<f64>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl PolledClock {
    pub(crate) fn spawn(position: Arc<dyn PlaybackPosition>, interval: Duration) -> Result<Self> {
        let (tx, rx) = channel::unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let worker = thread::Builder::new()
            .name("danmaku-clock".to_string())
            .spawn(move || {
                while !stop_flag.load(Ordering::Acquire) {
                    let Some(secs) = position.position_secs() else {
                        debug!("playback ended, polling timer exits");
                        break;
                    };
                    if tx.send(secs).is_err() {
                        break;
                    }
                    thread::sleep(interval);
                }
            })
            .context("failed to spawn clock polling thread")?;

        Ok(Self {
            rx,
            stop,
            worker: Some(worker),
        })
    }
}

impl ClockSource for PolledClock {
    fn samples(&self) -> &Receiver<f64> {
        &self.rx
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for PolledClock {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Session loop
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SessionStats {
    pub(crate) samples: usize,
    pub(crate) activated: usize,
    pub(crate) expired: usize,
    pub(crate) released: usize,
}

/// Ticks `scheduler` with every sample from `clock` until the source
/// disconnects, forwarding transitions to `renderer`.
pub(crate) fn drive<C, R>(scheduler: &mut Scheduler, clock: &C, renderer: &mut R) -> SessionStats
where
    C: ClockSource + ?Sized,
    R: Renderer + ?Sized,
{
    let mut stats = SessionStats::default();
    for secs in clock.samples().iter() {
        stats.samples += 1;
        let outcome = scheduler.on_clock_sample(secs);
        stats.expired += outcome.expire.len();
        stats.activated += outcome.activate.len();
        for handle in outcome.expire {
            renderer.expire(handle);
        }
        for activation in outcome.activate {
            renderer.activate(activation);
        }
        for handle in renderer.finished() {
            if scheduler.release(handle) {
                stats.released += 1;
            }
        }
    }
    info!(
        samples = stats.samples,
        activated = stats.activated,
        expired = stats.expired,
        released = stats.released,
        "playback session finished"
    );
    stats
}

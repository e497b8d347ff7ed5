//! Playback-clock driven comment scheduling.
//!
//! The scheduler owns one episode's [`CommentIndex`] and turns clock samples
//! into activate/expire transitions. Samples are classified against the last
//! observed second:
//!
//! - unchanged second: nothing happens (paused or stalled playback);
//! - small forward step: every newly entered bucket is emitted;
//! - anything else (backward seek, large skip): all active comments expire
//!   and only the bucket at the new position is emitted.
//!
//! Skipped buckets are never caught up.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::comment::{Comment, CommentIndex, bucket_of};
use crate::settings::{DanmakuSettings, SharedSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SchedulerOptions {
    /// Largest forward step, in seconds, still treated as continuous playback.
    pub(crate) max_forward_gap: u64,
    /// Seconds an activated comment stays active before the scheduler expires
    /// it on forward playback. 0 leaves expiry to jumps and the renderer.
    pub(crate) retain_secs: u64,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_forward_gap: 2,
            retain_secs: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct CommentHandle(u64);

impl CommentHandle {
    pub(crate) fn id(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Activation {
    pub(crate) handle: CommentHandle,
    pub(crate) comment: Comment,
    /// Settings the comment was admitted under.
    pub(crate) settings: Arc<DanmakuSettings>,
}

/// Result of one tick. All expirations happen before any activation.
#[derive(Debug, Default)]
pub(crate) struct TickOutcome {
    pub(crate) expire: Vec<CommentHandle>,
    pub(crate) activate: Vec<Activation>,
}

impl TickOutcome {
    pub(crate) fn is_empty(&self) -> bool {
        self.expire.is_empty() && self.activate.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SchedulerPhase {
    Idle,
    Ready,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleKind {
    First,
    Unchanged,
    Forward { from: u64 },
    Jump { from: u64 },
}

#[derive(Debug, Clone, Copy)]
struct ActiveComment {
    handle: CommentHandle,
    bucket: u64,
}

#[derive(Debug, Default)]
struct SchedulerState {
    last_second: Option<u64>,
    active: Vec<ActiveComment>,
    emitted: HashMap<u64, usize>,
    next_handle: u64,
}

impl SchedulerState {
    fn starting_at(next_handle: u64) -> Self {
        Self {
            next_handle,
            ..Self::default()
        }
    }

    fn classify(&self, second: u64, options: &SchedulerOptions) -> SampleKind {
        let Some(last) = self.last_second else {
            return SampleKind::First;
        };
        if second == last {
            SampleKind::Unchanged
        } else if second > last && second - last <= options.max_forward_gap {
            SampleKind::Forward { from: last }
        } else {
            SampleKind::Jump { from: last }
        }
    }

    fn expire_all(&mut self, outcome: &mut TickOutcome) {
        outcome
            .expire
            .extend(self.active.drain(..).map(|active| active.handle));
        self.emitted.clear();
    }

    fn expire_older_than(&mut self, second: u64, retain_secs: u64, outcome: &mut TickOutcome) {
        if retain_secs == 0 {
            return;
        }
        self.active.retain(|active| {
            let stale = active.bucket.saturating_add(retain_secs) <= second;
            if stale {
                outcome.expire.push(active.handle);
            }
            !stale
        });
    }

    fn emit_bucket(
        &mut self,
        index: &CommentIndex,
        second: u64,
        settings: &Arc<DanmakuSettings>,
        outcome: &mut TickOutcome,
    ) {
        let already = self.emitted.get(&second).copied().unwrap_or(0);
        let budget = settings
            .density_cap()
            .map(|cap| cap.saturating_sub(already));
        if budget == Some(0) {
            return;
        }

        let admitted = index.bucket(second).iter().filter(|comment| {
            !settings.excludes_mode(comment.mode())
                && !settings.excludes_author(comment.author_category())
        });

        let mut emitted_now = 0;
        for comment in admitted {
            if budget.is_some_and(|budget| emitted_now >= budget) {
                break;
            }
            let handle = CommentHandle(self.next_handle);
            self.next_handle += 1;
            self.active.push(ActiveComment {
                handle,
                bucket: second,
            });
            outcome.activate.push(Activation {
                handle,
                comment: comment.clone(),
                settings: Arc::clone(settings),
            });
            emitted_now += 1;
        }

        if emitted_now > 0 {
            *self.emitted.entry(second).or_default() += emitted_now;
        }
    }
}

/// One playback session's scheduler. Driven by a single clock producer; see
/// [`crate::clock`].
#[derive(Debug)]
pub(crate) struct Scheduler {
    settings: SharedSettings,
    options: SchedulerOptions,
    index: Option<CommentIndex>,
    state: SchedulerState,
    /// Set while the clock keeps delivering unusable samples; only the first
    /// one of a run is logged.
    clock_invalid: bool,
}

impl Scheduler {
    pub(crate) fn new(settings: SharedSettings, options: SchedulerOptions) -> Self {
        Self {
            settings,
            options,
            index: None,
            state: SchedulerState::default(),
            clock_invalid: false,
        }
    }

    /// Installs a new episode's index. Comments still active from the previous
    /// episode are returned so the renderer can clear them.
    pub(crate) fn load(&mut self, index: CommentIndex) -> Vec<CommentHandle> {
        let leftover = self.unload();
        debug!(
            comments = index.len(),
            buckets = index.bucket_count(),
            "comment index loaded"
        );
        self.index = Some(index);
        leftover
    }

    pub(crate) fn unload(&mut self) -> Vec<CommentHandle> {
        let leftover = self
            .state
            .active
            .iter()
            .map(|active| active.handle)
            .collect();
        self.index = None;
        self.state = SchedulerState::starting_at(self.state.next_handle);
        leftover
    }

    pub(crate) fn phase(&self) -> SchedulerPhase {
        match (&self.index, self.state.last_second) {
            (None, _) => SchedulerPhase::Idle,
            (Some(_), None) => SchedulerPhase::Ready,
            (Some(_), Some(_)) => SchedulerPhase::Running,
        }
    }

    pub(crate) fn last_observed_second(&self) -> Option<u64> {
        self.state.last_second
    }

    pub(crate) fn active_count(&self) -> usize {
        self.state.active.len()
    }

    /// Forgets a comment whose on-screen lifetime ended. No expire event is
    /// produced for it afterwards.
    pub(crate) fn release(&mut self, handle: CommentHandle) -> bool {
        let before = self.state.active.len();
        self.state.active.retain(|active| active.handle != handle);
        self.state.active.len() != before
    }

    pub(crate) fn on_clock_sample(&mut self, raw_secs: f64) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        let Some(index) = self.index.as_ref() else {
            return outcome;
        };
        if !raw_secs.is_finite() || raw_secs < 0.0 {
            if !self.clock_invalid {
                warn!(raw_secs, "ignoring invalid clock samples until the clock recovers");
                self.clock_invalid = true;
            }
            return outcome;
        }
        if self.clock_invalid {
            debug!(raw_secs, "clock delivers valid samples again");
            self.clock_invalid = false;
        }

        let settings = self.settings.snapshot();
        let effective = (raw_secs + settings.cur_ep_offset).max(0.0);
        let second = bucket_of(effective);
        let state = &mut self.state;

        match state.classify(second, &self.options) {
            SampleKind::Unchanged => return outcome,
            SampleKind::First => {
                state.emit_bucket(index, second, &settings, &mut outcome);
            }
            SampleKind::Forward { from } => {
                state.expire_older_than(second, self.options.retain_secs, &mut outcome);
                for bucket in from + 1..=second {
                    state.emit_bucket(index, bucket, &settings, &mut outcome);
                }
                state.emitted.retain(|bucket, _| *bucket >= second);
            }
            SampleKind::Jump { from } => {
                debug!(from, to = second, "clock jump, reseeding");
                state.expire_all(&mut outcome);
                state.emit_bucket(index, second, &settings, &mut outcome);
            }
        }

        state.last_second = Some(second);
        outcome
    }
}

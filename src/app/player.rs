use std::time::{Duration, Instant};

use tracing::warn;

use crate::clock::PlaybackPosition;

const MIN_RATE: f64 = 0.1;

/// Wall-clock driven stand-in for a native player: plays `duration` media
/// seconds from `from` at `rate`, optionally seeking once.
#[derive(Debug, Clone)]
pub(super) struct SimulatedPlayer {
    started: Instant,
    from: f64,
    rate: f64,
    duration: f64,
    seek: Option<(f64, f64)>,
}

impl SimulatedPlayer {
    pub(super) fn start(from: f64, rate: f64, duration: f64, seek: Option<(f64, f64)>) -> Self {
        let rate = if rate.is_finite() && rate >= MIN_RATE {
            rate
        } else {
            warn!(rate, min = MIN_RATE, "unsupported playback rate, clamping");
            MIN_RATE
        };
        Self {
            started: Instant::now(),
            from: from.max(0.0),
            rate,
            duration: duration.max(0.0),
            seek,
        }
    }

    pub(super) fn position_after(&self, elapsed: Duration) -> Option<f64> {
        let played = elapsed.as_secs_f64() * self.rate;
        if played >= self.duration {
            return None;
        }
        let position = self.from + played;
        match self.seek {
            Some((at, to)) if self.from < at && position >= at => Some(to.max(0.0) + (position - at)),
            _ => Some(position),
        }
    }
}

impl PlaybackPosition for SimulatedPlayer {
    fn position_secs(&self) -> Option<f64> {
        self.position_after(self.started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_at_playback_rate() {
        let player = SimulatedPlayer::start(10.0, 2.0, 30.0, None);
        assert_eq!(player.position_after(Duration::ZERO), Some(10.0));
        assert_eq!(player.position_after(Duration::from_secs(3)), Some(16.0));
    }

    #[test]
    fn ends_after_duration() {
        let player = SimulatedPlayer::start(0.0, 1.0, 5.0, None);
        assert!(player.position_after(Duration::from_millis(4_900)).is_some());
        assert_eq!(player.position_after(Duration::from_secs(5)), None);
    }

    #[test]
    fn seeks_once_when_reaching_seek_point() {
        let player = SimulatedPlayer::start(0.0, 1.0, 60.0, Some((10.0, 3.0)));
        assert_eq!(player.position_after(Duration::from_secs(9)), Some(9.0));
        assert_eq!(player.position_after(Duration::from_secs(10)), Some(3.0));
        assert_eq!(player.position_after(Duration::from_secs(12)), Some(5.0));
    }

    #[test]
    fn invalid_rate_is_clamped() {
        let player = SimulatedPlayer::start(0.0, 0.0, 60.0, None);
        assert_eq!(player.position_after(Duration::from_secs(10)), Some(1.0));
    }
}

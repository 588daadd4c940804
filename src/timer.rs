use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which countdown is running. At most one timer exists per session, so
/// starting one implicitly cancels the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    Rest,
    Exercise,
}

/// A running countdown anchored to a wall-clock start instant.
///
/// Remaining time is always recomputed from `started_at` instead of counting
/// down a stored value, so a timer survives process restarts and long gaps
/// between invocations without drifting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTimer {
    pub kind: TimerKind,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u32,
}

impl ActiveTimer {
    pub fn start(kind: TimerKind, duration_secs: u32, now: DateTime<Utc>) -> Self {
        Self {
            kind,
            started_at: now,
            duration_secs,
        }
    }

    /// Seconds left, clamped at zero. A start instant in the future (clock
    /// skew) reads as nothing elapsed yet.
    pub fn remaining(&self, now: DateTime<Utc>) -> u32 {
        let elapsed = (now - self.started_at).num_seconds().max(0);
        let elapsed = u32::try_from(elapsed).unwrap_or(u32::MAX);
        self.duration_secs.saturating_sub(elapsed)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.remaining(now) == 0
    }

    /// Fraction of the countdown already elapsed, in `0.0..=1.0`.
    pub fn progress(&self, now: DateTime<Utc>) -> f32 {
        if self.duration_secs == 0 {
            return 1.0;
        }
        let done = self.duration_secs - self.remaining(now);
        done as f32 / self.duration_secs as f32
    }
}

/// Haptic cue emitted near the end of a countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pulse {
    Light,
    Strong,
}

/// Cue for a given remaining-seconds reading: light taps at 3, 2 and 1,
/// a strong one at zero, silence otherwise.
pub fn pulse_at(remaining_secs: u32) -> Option<Pulse> {
    match remaining_secs {
        0 => Some(Pulse::Strong),
        1..=3 => Some(Pulse::Light),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn remaining_is_recomputed_from_wall_clock() {
        let t0 = Utc::now();
        let timer = ActiveTimer::start(TimerKind::Rest, 60, t0);
        assert_eq!(timer.remaining(t0), 60);
        assert_eq!(timer.remaining(t0 + Duration::seconds(35)), 25);
    }

    #[test]
    fn remaining_clamps_at_zero_after_expiry() {
        let t0 = Utc::now();
        let timer = ActiveTimer::start(TimerKind::Rest, 60, t0);
        assert_eq!(timer.remaining(t0 + Duration::seconds(60)), 0);
        assert_eq!(timer.remaining(t0 + Duration::seconds(300)), 0);
        assert!(timer.is_expired(t0 + Duration::seconds(300)));
    }

    #[test]
    fn future_start_instant_reads_as_nothing_elapsed() {
        let t0 = Utc::now();
        let timer = ActiveTimer::start(TimerKind::Exercise, 45, t0);
        assert_eq!(timer.remaining(t0 - Duration::seconds(10)), 45);
    }

    #[test]
    fn progress_tracks_elapsed_fraction() {
        let t0 = Utc::now();
        let timer = ActiveTimer::start(TimerKind::Rest, 100, t0);
        assert_eq!(timer.progress(t0), 0.0);
        assert_eq!(timer.progress(t0 + Duration::seconds(50)), 0.5);
        assert_eq!(timer.progress(t0 + Duration::seconds(200)), 1.0);
    }

    #[test]
    fn pulses_fire_on_the_last_three_seconds_and_zero() {
        assert_eq!(pulse_at(10), None);
        assert_eq!(pulse_at(3), Some(Pulse::Light));
        assert_eq!(pulse_at(2), Some(Pulse::Light));
        assert_eq!(pulse_at(1), Some(Pulse::Light));
        assert_eq!(pulse_at(0), Some(Pulse::Strong));
    }

    #[test]
    fn survives_a_serialize_round_trip() {
        let timer = ActiveTimer::start(TimerKind::Exercise, 90, Utc::now());
        let json = serde_json::to_string(&timer).unwrap();
        let back: ActiveTimer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, timer);
    }
}

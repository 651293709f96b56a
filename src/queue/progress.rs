//! Contatori del progress di una conversione in corso.

use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// One record reported by the encoder's progress stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    /// Media time encoded so far
    pub converted: Duration,
    /// Encoding speed relative to realtime, 0.0 when unknown
    pub speed: f64,
    pub frame: Option<u64>,
    pub dup_frames: Option<u64>,
    pub drop_frames: Option<u64>,
}

#[derive(Debug, Default)]
struct ProgressState {
    duration: Duration,
    converted: Duration,
    speed: f64,
}

/// Lock-protected progress of a single conversion
#[derive(Debug, Default)]
pub struct Progress {
    state: Mutex<ProgressState>,
}

/// Point-in-time copy of a [`Progress`] for reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub duration_secs: f64,
    pub converted_secs: f64,
    pub speed: f64,
    pub completed: f64,
    /// -1.0 while the speed is unknown
    pub remaining_secs: f64,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Total media duration, taken once from the source stats
    pub fn set_duration(&self, duration: Duration) {
        self.state().duration = duration;
    }

    pub fn update(&self, update: &ProgressUpdate) {
        let mut state = self.state();
        state.converted = update.converted;
        state.speed = update.speed;
    }

    pub fn reset(&self) {
        let mut state = self.state();
        state.converted = Duration::ZERO;
        state.speed = 0.0;
    }

    pub fn duration(&self) -> Duration {
        self.state().duration
    }

    pub fn converted(&self) -> Duration {
        self.state().converted
    }

    pub fn speed(&self) -> f64 {
        self.state().speed
    }

    /// Fraction done in `0.0..=1.0`; 0.0 when the duration is unknown
    pub fn completed(&self) -> f64 {
        let state = self.state();
        Self::completed_of(&state)
    }

    fn completed_of(state: &ProgressState) -> f64 {
        if state.duration.is_zero() {
            return 0.0;
        }
        (state.converted.as_secs_f64() / state.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    /// Wall-clock time left, `None` while the speed is unknown
    pub fn remaining(&self) -> Option<Duration> {
        let state = self.state();
        Self::remaining_of(&state)
    }

    fn remaining_of(state: &ProgressState) -> Option<Duration> {
        if state.speed.is_nan() || state.speed <= 0.0 {
            return None;
        }
        let left = state.duration.saturating_sub(state.converted);
        Some(left.div_f64(state.speed))
    }

    /// Seconds left, or the -1.0 sentinel when the speed is unknown
    pub fn remaining_secs(&self) -> f64 {
        self.remaining().map_or(-1.0, |d| d.as_secs_f64())
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state();
        ProgressSnapshot {
            duration_secs: state.duration.as_secs_f64(),
            converted_secs: state.converted.as_secs_f64(),
            speed: state.speed,
            completed: Self::completed_of(&state),
            remaining_secs: Self::remaining_of(&state).map_or(-1.0, |d| d.as_secs_f64()),
        }
    }
}

//! Performance measurement tools.

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::filter::ema::{Ema, EmaState};
use crate::filter::Filter;

const EMA_ALPHA: f32 = 0.3;

/// Measures and averages the duration of an operation across frames.
///
/// Recorded durations are smoothed with an exponential moving average, so the value shown
/// by the `{}` ([`std::fmt::Display`]) implementation tracks recent frames. Displaying a
/// timer resets it.
pub struct Timer {
    name: &'static str,
    ema: Ema,
    state: Mutex<TimerState>,
}

struct TimerState {
    ema: EmaState,
    avg_secs: f32,
    samples: usize,
}

impl TimerState {
    fn fresh() -> Self {
        Self {
            ema: EmaState::default(),
            avg_secs: 0.0,
            samples: 0,
        }
    }
}

impl Timer {
    /// Creates a new timer with no recorded samples.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ema: Ema::new(EMA_ALPHA),
            state: Mutex::new(TimerState::fresh()),
        }
    }

    /// Returns the name the timer was created with.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Invokes a closure, measuring and recording the time it takes.
    pub fn time<T>(&self, timee: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        timee()
    }

    /// Starts timing an operation using a drop guard.
    ///
    /// When the returned [`TimerGuard`] is dropped, the time between the call to `start`
    /// and the drop is recorded.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    /// Returns the smoothed average duration, or `None` if nothing was recorded since the
    /// last reset.
    pub fn average(&self) -> Option<Duration> {
        let state = self.state.lock().unwrap();
        (state.samples > 0).then(|| Duration::from_secs_f32(state.avg_secs))
    }

    /// Returns the number of samples recorded since the last reset.
    pub fn samples(&self) -> usize {
        self.state.lock().unwrap().samples
    }

    fn record(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap();
        state.avg_secs = self.ema.filter(&mut state.ema, duration.as_secs_f32());
        state.samples += 1;
    }
}

/// Displays the smoothed average recorded time and resets the timer.
impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut state = self.state.lock().unwrap();
        let avg_ms = state.avg_secs * 1000.0;
        let samples = state.samples;
        *state = TimerState::fresh();

        write!(f, "{}: {samples}x{avg_ms:.01}ms", self.name)
    }
}

/// Cloning a timer resets its collected timings.
impl Clone for Timer {
    fn clone(&self) -> Self {
        Self::new(self.name)
    }
}

/// Guard returned by [`Timer::start`]. Records the elapsed time when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.record(self.start.elapsed());
    }
}

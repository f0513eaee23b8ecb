//! Time bases the scheduler samples.
//!
//! A [`ClockSource`] reports monotonically nondecreasing time in seconds. The
//! scheduler only ever reads it; nothing in this crate drives or adjusts a
//! clock except [`ManualClock`], whose owner advances it explicitly.

use std::{
    cell::Cell,
    rc::Rc,
    time::{Duration, Instant},
};

use crate::{MetronomeError, Result};

/// Monotonic, high-resolution time base.
pub trait ClockSource {
    /// Current time in seconds. Fails with
    /// [`MetronomeError::EngineNotReady`] once the clock is unavailable.
    fn current_time(&self) -> Result<f64>;

    /// Idles until `deadline` (in this clock's seconds) has been reached.
    ///
    /// Only the cooperative event loop calls this, between callbacks.
    fn wait_until(&self, deadline: f64) -> Result<()>;

    fn is_available(&self) -> bool {
        self.current_time().is_ok()
    }
}

impl<C: ClockSource + ?Sized> ClockSource for &C {
    fn current_time(&self) -> Result<f64> {
        (**self).current_time()
    }

    fn wait_until(&self, deadline: f64) -> Result<()> {
        (**self).wait_until(deadline)
    }
}

/// Wall clock measured from the moment it was created.
///
/// Clones share the same origin and the same open/closed state.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
    closed: Rc<Cell<bool>>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            closed: Rc::new(Cell::new(false)),
        }
    }

    /// Marks the clock as permanently unavailable, like a closed audio device.
    pub fn close(&self) {
        self.closed.set(true);
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for SystemClock {
    fn current_time(&self) -> Result<f64> {
        if self.closed.get() {
            return Err(MetronomeError::not_ready("system clock has been closed"));
        }
        Ok(self.origin.elapsed().as_secs_f64())
    }

    fn wait_until(&self, deadline: f64) -> Result<()> {
        let now = self.current_time()?;
        if deadline > now {
            std::thread::sleep(Duration::from_secs_f64(deadline - now));
        }
        Ok(())
    }
}

/// Virtual clock that only moves when its owner says so.
///
/// Clones share the same underlying time, so a test can keep one handle while
/// the scheduler owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    time: Rc<Cell<f64>>,
    closed: Rc<Cell<bool>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(seconds: f64) -> Self {
        let clock = Self::default();
        clock.set(seconds);
        clock
    }

    pub fn now(&self) -> f64 {
        self.time.get()
    }

    pub fn advance(&self, delta: f64) {
        self.set(self.time.get() + delta.max(0.0));
    }

    /// Moves the clock to `seconds`; never moves it backwards.
    pub fn set(&self, seconds: f64) {
        if seconds > self.time.get() {
            self.time.set(seconds);
        }
    }

    pub fn close(&self) {
        self.closed.set(true);
    }
}

impl ClockSource for ManualClock {
    fn current_time(&self) -> Result<f64> {
        if self.closed.get() {
            return Err(MetronomeError::not_ready("manual clock has been closed"));
        }
        Ok(self.time.get())
    }

    fn wait_until(&self, deadline: f64) -> Result<()> {
        self.current_time()?;
        self.set(deadline);
        Ok(())
    }
}

/**
 * bridge/latch.rs
 *
 * One-shot readiness latch with timeout-bounded waits
 */

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::WaitError;

#[derive(Default)]
pub struct Latch {
    fired: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the latch. Returns true only for the call that opened it.
    pub fn fire(&self) -> bool {
        let mut fired = self.fired.lock();
        if *fired {
            return false;
        }
        *fired = true;
        self.cond.notify_all();
        true
    }

    pub fn is_fired(&self) -> bool {
        *self.fired.lock()
    }

    /// Block until the latch opens or `timeout` elapses
    pub fn wait(&self, timeout: Duration) -> Result<(), WaitError> {
        let deadline = Instant::now() + timeout;
        let mut fired = self.fired.lock();
        while !*fired {
            if self.cond.wait_until(&mut fired, deadline).timed_out() {
                return if *fired { Ok(()) } else { Err(WaitError::Timeout(timeout)) };
            }
        }
        Ok(())
    }
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Timer Objects
//!
//! A preemption timer is a one-shot POSIX timer on `CLOCK_MONOTONIC` whose
//! expiry is delivered as [`PREEMPT_SIGNAL`] to the OS thread that created
//! it (`SIGEV_THREAD_ID`). Targeting the creating thread keeps independent
//! schedulers on different OS threads from preempting each other.
//!
//! # Design
//!
//! - **One-shot**: every expiry must be followed by [`PreemptionTimer::rearm`]
//! - **Signal-safe re-arm**: `rearm` only calls `timer_settime`
//! - **Scoped**: the kernel timer is deleted on drop
//!
//! # Usage
//!
//! ```ignore
//! let timer = PreemptionTimer::create(Duration::from_millis(10))?;
//! timer.arm()?;
//! // ... SIGALRM arrives after 10 ms, handler calls timer.rearm()
//! ```

use core::mem::MaybeUninit;
use core::ptr;
use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use core::time::Duration;

use log::debug;

use crate::error::{Result, SchedulerError};
use crate::interrupt::PREEMPT_SIGNAL;

/// ============================================================================
/// Timer State
/// ============================================================================

/// Timer state
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Timer is disarmed
    Disarmed = 0,

    /// Timer is armed (waiting for expiry)
    Armed = 1,
}

impl TimerState {
    /// Create from raw value
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Armed,
            _ => Self::Disarmed,
        }
    }

    /// Get raw value
    pub const fn into_raw(self) -> u8 {
        self as u8
    }
}

/// ============================================================================
/// Preemption Timer
/// ============================================================================

/// Per-OS-thread one-shot preemption timer
#[derive(Debug)]
pub struct PreemptionTimer {
    /// Kernel timer handle
    id: libc::timer_t,

    /// Expiry interval
    interval: Duration,

    /// Current state
    state: AtomicU8,

    /// Number of times the timer was (re)armed
    arms: AtomicU64,
}

impl PreemptionTimer {
    /// Create a disarmed timer targeting the calling OS thread
    ///
    /// # Arguments
    ///
    /// * `interval` - Time between arming and expiry (non-zero)
    ///
    /// # Returns
    ///
    /// * `Ok(timer)` - The timer
    /// * `Err(SchedulerError::Timer)` - `timer_create` failed
    pub fn create(interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidConfig("zero time slice"));
        }

        // SAFETY: gettid has no preconditions
        let tid = unsafe { libc::syscall(libc::SYS_gettid) } as libc::c_int;

        // SAFETY: sigevent is plain old data; zero is a valid bit pattern
        let mut event: libc::sigevent = unsafe { core::mem::zeroed() };
        event.sigev_notify = libc::SIGEV_THREAD_ID;
        event.sigev_signo = PREEMPT_SIGNAL;
        event.sigev_notify_thread_id = tid;

        let mut id = MaybeUninit::<libc::timer_t>::uninit();
        // SAFETY: both pointers are valid for the duration of the call
        let rc = unsafe { libc::timer_create(libc::CLOCK_MONOTONIC, &mut event, id.as_mut_ptr()) };
        if rc != 0 {
            return Err(SchedulerError::last_timer_error());
        }

        debug!("preemption timer created for tid {tid}, interval {interval:?}");

        Ok(Self {
            // SAFETY: timer_create succeeded and initialized the handle
            id: unsafe { id.assume_init() },
            interval,
            state: AtomicU8::new(TimerState::Disarmed.into_raw()),
            arms: AtomicU64::new(0),
        })
    }

    /// Get the timer state
    pub fn state(&self) -> TimerState {
        TimerState::from_raw(self.state.load(Ordering::SeqCst))
    }

    /// Get how many times the timer has been armed
    pub fn arm_count(&self) -> u64 {
        self.arms.load(Ordering::Relaxed)
    }

    /// Arm the timer for one interval
    ///
    /// Arming an armed timer restarts its interval.
    pub fn arm(&self) -> Result<()> {
        if self.rearm() {
            Ok(())
        } else {
            Err(SchedulerError::last_timer_error())
        }
    }

    /// Arm the timer from a signal handler
    ///
    /// Async-signal-safe: no allocation, no locking, no logging.
    ///
    /// # Returns
    ///
    /// `true` if the timer is armed
    pub fn rearm(&self) -> bool {
        let spec = libc::itimerspec {
            it_interval: libc::timespec { tv_sec: 0, tv_nsec: 0 },
            it_value: timespec(self.interval),
        };
        if self.settime(&spec) {
            self.state.store(TimerState::Armed.into_raw(), Ordering::SeqCst);
            self.arms.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Cancel a pending expiry
    pub fn disarm(&self) {
        let spec = libc::itimerspec {
            it_interval: libc::timespec { tv_sec: 0, tv_nsec: 0 },
            it_value: libc::timespec { tv_sec: 0, tv_nsec: 0 },
        };
        if self.settime(&spec) {
            self.state.store(TimerState::Disarmed.into_raw(), Ordering::SeqCst);
        }
    }

    fn settime(&self, spec: &libc::itimerspec) -> bool {
        // SAFETY: `id` is a live timer handle and `spec` a valid itimerspec
        unsafe { libc::timer_settime(self.id, 0, spec, ptr::null_mut()) == 0 }
    }
}

impl Drop for PreemptionTimer {
    fn drop(&mut self) {
        // SAFETY: `id` came from timer_create and is deleted exactly once;
        // deleting also cancels any pending expiry
        unsafe { libc::timer_delete(self.id) };
        debug!("preemption timer deleted after {} arms", self.arm_count());
    }
}

/// Convert a duration to a timespec, saturating the seconds
fn timespec(duration: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: libc::time_t::try_from(duration.as_secs()).unwrap_or(libc::time_t::MAX),
        tv_nsec: duration.subsec_nanos() as libc::c_long,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_state_raw() {
        assert_eq!(TimerState::from_raw(TimerState::Armed.into_raw()), TimerState::Armed);
        assert_eq!(TimerState::from_raw(7), TimerState::Disarmed);
    }

    #[test]
    fn test_timespec_conversion() {
        let ts = timespec(Duration::from_millis(1500));
        assert_eq!(ts.tv_sec, 1);
        assert_eq!(ts.tv_nsec, 500_000_000);
    }

    #[test]
    fn test_timer_zero_interval() {
        assert!(matches!(
            PreemptionTimer::create(Duration::ZERO),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_timer_arm_disarm() {
        // Long interval: the timer must never fire during the test
        let timer = PreemptionTimer::create(Duration::from_secs(3600)).unwrap();
        assert_eq!(timer.state(), TimerState::Disarmed);

        timer.arm().unwrap();
        assert_eq!(timer.state(), TimerState::Armed);
        assert_eq!(timer.arm_count(), 1);

        assert!(timer.rearm());
        assert_eq!(timer.arm_count(), 2);

        timer.disarm();
        assert_eq!(timer.state(), TimerState::Disarmed);
    }
}

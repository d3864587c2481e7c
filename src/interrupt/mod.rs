// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Preemption signal handling
//!
//! The preemption timer expires as [`PREEMPT_SIGNAL`]. The handler is
//! installed for the duration of each preemptive run through a
//! [`HandlerGuard`]. Schedulers on different OS threads share it: the first
//! guard saves the previous disposition, every guard re-installs the
//! handler, and the last guard to drop restores what was there before. On
//! OS threads without a running scheduler the handler does nothing.
//!
//! The handler runs on the interrupted logical thread's stack. When it
//! forces a yield it switches away from inside the handler, so it first
//! unblocks the signal (the kernel blocks it for the handler's duration);
//! otherwise every other logical thread would run with preemption blocked.
//! Nested firings are masked by [`crate::sync::PreemptState`] instead.

use core::mem;
use core::ptr;
use std::io;

use spin::Mutex;

use crate::error::{Result, SchedulerError};

/// Signal used for preemption
pub const PREEMPT_SIGNAL: libc::c_int = libc::SIGALRM;

/// Process-wide handler bookkeeping
struct Registration {
    /// Live guards
    users: usize,
    /// Disposition found by the first guard
    previous: Option<libc::sigaction>,
}

static REGISTRATION: Mutex<Registration> = Mutex::new(Registration {
    users: 0,
    previous: None,
});

/// Keeps the preemption handler installed while alive
#[derive(Debug)]
pub struct HandlerGuard {
    _private: (),
}

/// Install the preemption signal handler
///
/// Calls `sigaction` every time, so a disposition changed between runs is
/// overridden again.
///
/// # Returns
///
/// * `Ok(guard)` - The handler stays installed until the last guard drops
/// * `Err(SchedulerError::Signal)` - `sigaction` failed
pub fn install() -> Result<HandlerGuard> {
    let mut registration = REGISTRATION.lock();

    // SAFETY: sigaction is plain old data; zero is a valid bit pattern
    let mut action: libc::sigaction = unsafe { mem::zeroed() };
    action.sa_sigaction = on_preempt_signal as extern "C" fn(libc::c_int) as usize;
    action.sa_flags = libc::SA_RESTART;
    let mut previous: libc::sigaction = unsafe { mem::zeroed() };

    // SAFETY: both structs are initialized and outlive the calls
    let rc = unsafe {
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(PREEMPT_SIGNAL, &action, &mut previous)
    };
    if rc != 0 {
        return Err(SchedulerError::Signal(io::Error::last_os_error()));
    }

    if registration.users == 0 {
        registration.previous = Some(previous);
        log::debug!("preemption handler installed for signal {PREEMPT_SIGNAL}");
    }
    registration.users += 1;
    Ok(HandlerGuard { _private: () })
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        let mut registration = REGISTRATION.lock();
        registration.users -= 1;
        if registration.users > 0 {
            return;
        }
        if let Some(previous) = registration.previous.take() {
            // SAFETY: `previous` was filled in by sigaction
            unsafe { libc::sigaction(PREEMPT_SIGNAL, &previous, ptr::null_mut()) };
            log::debug!("preemption handler removed");
        }
    }
}

/// Build a set holding only [`PREEMPT_SIGNAL`]
fn preempt_set() -> libc::sigset_t {
    // SAFETY: `set` is initialized by sigemptyset before use
    unsafe {
        let mut set: libc::sigset_t = mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, PREEMPT_SIGNAL);
        set
    }
}

/// Unblock [`PREEMPT_SIGNAL`] for the calling OS thread
///
/// Async-signal-safe.
pub fn unblock_preempt_signal() {
    let set = preempt_set();
    // SAFETY: `set` is a valid signal set
    unsafe { libc::pthread_sigmask(libc::SIG_UNBLOCK, &set, ptr::null_mut()) };
}

/// Unblocks [`PREEMPT_SIGNAL`] on the calling OS thread while alive
///
/// Blocks it again on drop if it was blocked before.
#[derive(Debug)]
pub struct UnblockGuard {
    was_blocked: bool,
}

impl UnblockGuard {
    /// Unblock the signal, remembering whether it was blocked
    pub fn unblock() -> Self {
        let set = preempt_set();
        // SAFETY: `old` is written by pthread_sigmask before it is read
        let was_blocked = unsafe {
            let mut old: libc::sigset_t = mem::zeroed();
            libc::pthread_sigmask(libc::SIG_UNBLOCK, &set, &mut old);
            libc::sigismember(&old, PREEMPT_SIGNAL) == 1
        };
        Self { was_blocked }
    }
}

impl Drop for UnblockGuard {
    fn drop(&mut self) {
        if self.was_blocked {
            let set = preempt_set();
            // SAFETY: `set` is a valid signal set
            unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, ptr::null_mut()) };
        }
    }
}

/// Signal handler
///
/// Must stay async-signal-safe: no allocation, locking or logging here or
/// in anything it calls.
extern "C" fn on_preempt_signal(_signal: libc::c_int) {
    // errno belongs to the OS thread, which all logical threads share
    // SAFETY: __errno_location always returns a valid thread-local pointer
    let errno = unsafe { *libc::__errno_location() };

    crate::sched::scheduler::preempt_tick();

    // SAFETY: as above
    unsafe { *libc::__errno_location() = errno };
}

/// Get the current disposition of [`PREEMPT_SIGNAL`]
#[cfg(test)]
pub(crate) fn disposition() -> libc::sighandler_t {
    // SAFETY: querying only; `current` is written by sigaction
    unsafe {
        let mut current: libc::sigaction = mem::zeroed();
        libc::sigaction(PREEMPT_SIGNAL, ptr::null(), &mut current);
        current.sa_sigaction
    }
}

/// Check whether [`PREEMPT_SIGNAL`] is blocked on this OS thread
#[cfg(test)]
pub(crate) fn is_blocked() -> bool {
    // SAFETY: querying only; `current` is written by pthread_sigmask
    unsafe {
        let mut current: libc::sigset_t = mem::zeroed();
        libc::pthread_sigmask(libc::SIG_BLOCK, ptr::null(), &mut current);
        libc::sigismember(&current, PREEMPT_SIGNAL) == 1
    }
}

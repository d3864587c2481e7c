// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Scheduler errors
//!
//! Only two phases can report errors: registration (resource exhaustion,
//! rolled back before returning) and the setup part of
//! [`crate::Scheduler::run`] that happens before any logical thread is
//! dispatched. Once threads run, execution either completes or faults.

use std::io;

use thiserror::Error;

/// Errors reported by the scheduler
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The thread table could not grow to hold another control block
    #[error("control block allocation failed")]
    ControlBlockAlloc,

    /// The stack allocator could not provide memory
    #[error("stack allocation of {size} bytes failed")]
    StackAlloc {
        /// Bytes requested from the allocator
        size: usize,
    },

    /// No page-aligned region fits in the allocation
    #[error("cannot align stack at {base:#x} to {align:#x}")]
    StackAlign {
        /// Base address returned by the allocator
        base: usize,
        /// Requested alignment
        align: usize,
    },

    /// Creating or arming the preemption timer failed
    #[error("preemption timer: {0}")]
    Timer(#[source] io::Error),

    /// Installing the preemption signal handler failed
    #[error("preemption signal: {0}")]
    Signal(#[source] io::Error),

    /// A scheduler is already running on this OS thread
    #[error("a scheduler is already running on this thread")]
    AlreadyRunning,

    /// The configuration is unusable
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Result alias for scheduler operations
pub type Result<T> = core::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Build a timer error from the current `errno`
    pub(crate) fn last_timer_error() -> Self {
        Self::Timer(io::Error::last_os_error())
    }
}

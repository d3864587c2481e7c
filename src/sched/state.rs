// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread state
//!
//! Defines logical-thread states and their legal transitions.
//!
//! ```text
//! Init --dispatch--> Running --yield/preempt--> Sleeping
//!                       ^                          |
//!                       +-------redispatch---------+
//! Running --entry returns--> Terminated
//! ```

/// Thread states
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Registered, never dispatched
    Init,
    /// Currently running
    Running,
    /// Suspended by a voluntary or forced yield
    Sleeping,
    /// Entry function returned
    Terminated,
}

impl ThreadState {
    /// Check if the scheduler may dispatch a thread in this state
    pub fn is_runnable(self) -> bool {
        matches!(self, Self::Init | Self::Sleeping)
    }

    /// Check if the thread has finished
    pub fn is_terminated(self) -> bool {
        self == Self::Terminated
    }

    /// Check if `self -> next` is a legal transition
    pub fn can_transition(self, next: ThreadState) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::Running)
                | (Self::Running, Self::Sleeping)
                | (Self::Sleeping, Self::Running)
                | (Self::Running, Self::Terminated)
        )
    }
}

impl Default for ThreadState {
    fn default() -> Self {
        Self::Init
    }
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread representation
//!
//! Defines the control block and related types.

use core::any::Any;
use core::ops::Range;
use core::sync::atomic::{AtomicU64, Ordering};
use std::alloc::{self, Layout};

use crate::arch::Context;
use crate::error::{Result, SchedulerError};
use crate::mm::Stack;

use super::state::ThreadState;

/// Thread ID type
pub type ThreadId = u64;

/// Function entry point type
///
/// The classic "function plus one opaque word" form accepted by
/// [`crate::Scheduler::register`].
pub type EntryPoint = fn(usize);

/// Thread statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadStats {
    /// Number of times this thread has been dispatched
    pub schedule_count: u64,
    /// Number of voluntary context switches
    pub voluntary_switches: u64,
    /// Number of involuntary context switches (timer preemption)
    pub involuntary_switches: u64,
}

/// How a thread's entry function ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadOutcome {
    /// The entry function returned
    Completed,
    /// The entry function panicked; the panic was contained
    Panicked(String),
}

impl ThreadOutcome {
    /// Build an outcome from a caught panic payload
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            String::from("non-string panic payload")
        };
        Self::Panicked(message)
    }
}

/// Code a logical thread runs exactly once
///
/// Invoked through `&mut self` so the box holding it outlives the call and
/// is freed by the scheduler, not on the logical thread's stack.
pub(crate) trait Entry {
    fn invoke(&mut self);
}

struct OnceEntry<F>(Option<F>);

impl<F: FnOnce()> Entry for OnceEntry<F> {
    fn invoke(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

/// Box a closure as an [`Entry`]
///
/// Reports exhaustion as `ControlBlockAlloc` instead of aborting.
pub(crate) fn boxed_entry<'a, F: FnOnce() + 'a>(f: F) -> Result<Box<dyn Entry + 'a>> {
    let layout = Layout::new::<OnceEntry<F>>();
    if layout.size() == 0 {
        return Ok(Box::new(OnceEntry(Some(f))));
    }

    let raw = entry_alloc(layout).cast::<OnceEntry<F>>();
    if raw.is_null() {
        return Err(SchedulerError::ControlBlockAlloc);
    }
    // SAFETY: `raw` is a fresh global-allocator block with the layout of
    // `OnceEntry<F>`, which is what `Box` frees it with
    unsafe {
        raw.write(OnceEntry(Some(f)));
        Ok(Box::from_raw(raw))
    }
}

#[cfg(not(test))]
fn entry_alloc(layout: Layout) -> *mut u8 {
    // SAFETY: callers pass a non-zero-sized layout
    unsafe { alloc::alloc(layout) }
}

#[cfg(test)]
thread_local! {
    static FAIL_ENTRY_ALLOC: core::cell::Cell<bool> = const { core::cell::Cell::new(false) };
}

/// Make the next entry allocation on this OS thread fail
#[cfg(test)]
pub(crate) fn fail_next_entry_alloc() {
    FAIL_ENTRY_ALLOC.with(|fail| fail.set(true));
}

#[cfg(test)]
fn entry_alloc(layout: Layout) -> *mut u8 {
    if FAIL_ENTRY_ALLOC.with(|fail| fail.replace(false)) {
        return core::ptr::null_mut();
    }
    // SAFETY: callers pass a non-zero-sized layout
    unsafe { alloc::alloc(layout) }
}

/// Control block
///
/// The per-thread record: status, stack ownership and saved context.
pub struct ControlBlock<'a> {
    /// Unique thread ID
    pub(crate) id: ThreadId,
    /// Thread state
    pub(crate) status: ThreadState,
    /// Saved context while not running
    pub(crate) context: Context,
    /// Private stack, released by the owning table
    pub(crate) stack: Stack,
    /// Code to run
    pub(crate) entry: Option<Box<dyn Entry + 'a>>,
    /// Thread statistics
    pub(crate) stats: ThreadStats,
    /// Set when the thread terminates
    pub(crate) outcome: Option<ThreadOutcome>,
}

impl<'a> ControlBlock<'a> {
    /// Create a control block in `Init` state
    pub(crate) fn new(id: ThreadId, stack: Stack, entry: Box<dyn Entry + 'a>) -> Self {
        Self {
            id,
            status: ThreadState::Init,
            context: Context::empty(),
            stack,
            entry: Some(entry),
            stats: ThreadStats::default(),
            outcome: None,
        }
    }

    /// Get the thread ID
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Get the thread state
    pub fn state(&self) -> ThreadState {
        self.status
    }

    /// Get the thread statistics
    pub fn stats(&self) -> ThreadStats {
        self.stats
    }

    /// Get the usable stack range
    pub fn stack_range(&self) -> Range<usize> {
        self.stack.base()..self.stack.top()
    }

    /// Move to `next`, checking the transition in debug builds
    pub(crate) fn set_state(&mut self, next: ThreadState) {
        debug_assert!(
            self.status.can_transition(next),
            "illegal transition {:?} -> {:?}",
            self.status,
            next
        );
        self.status = next;
    }
}

/// Create a new thread ID
pub fn new_thread_id() -> ThreadId {
    static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

    NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed)
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Thread Table
//!
//! Owns every control block of one scheduler and the allocator behind
//! their stacks.
//!
//! # Design
//!
//! - Control blocks live in a `Vec` in registration order and are never
//!   moved once a run starts, so raw pointers into it stay valid.
//! - Round-robin *list order* is newest-first: registration prepends.
//!   List position `p` is vector index `len - 1 - p`.
//! - Stacks are released exactly once, by [`ThreadTable::teardown`] or
//!   on drop.

use log::debug;

use crate::error::{Result, SchedulerError};
use crate::mm::Stack;
use crate::traits::StackAllocator;

use super::thread::{new_thread_id, ControlBlock, Entry, ThreadId, ThreadOutcome, ThreadStats};

/// Final record of one thread, produced at teardown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadReport {
    /// Thread ID
    pub id: ThreadId,
    /// Thread statistics
    pub stats: ThreadStats,
    /// How the entry ended (`None` if it never ran)
    pub outcome: Option<ThreadOutcome>,
}

/// Thread table
pub struct ThreadTable<'a, A: StackAllocator> {
    /// Control blocks in registration order
    blocks: Vec<ControlBlock<'a>>,
    /// Stack memory provider
    allocator: A,
    /// Usable bytes per stack
    stack_size: usize,
    /// Stack base alignment
    page_size: usize,
    /// Scan anchor (vector index)
    current: Option<usize>,
}

impl<'a, A: StackAllocator> ThreadTable<'a, A> {
    /// Create an empty table
    pub fn new(allocator: A, stack_size: usize, page_size: usize) -> Self {
        Self {
            blocks: Vec::new(),
            allocator,
            stack_size,
            page_size,
            current: None,
        }
    }

    /// Register a new thread
    ///
    /// Allocates a control block in `Init` state with its own aligned
    /// stack and prepends it to the list order.
    ///
    /// # Returns
    ///
    /// * `Ok(id)` - The new thread's ID
    /// * `Err(_)` - Allocation failed; the table is unchanged and nothing
    ///   allocated by this call is left behind
    pub(crate) fn register(&mut self, entry: Box<dyn Entry + 'a>) -> Result<ThreadId> {
        // Reserve the slot first so the push below cannot fail after the
        // stack exists
        self.blocks
            .try_reserve(1)
            .map_err(|_| SchedulerError::ControlBlockAlloc)?;

        let stack = Stack::allocate(&self.allocator, self.stack_size, self.page_size)?;
        let id = new_thread_id();
        debug!(
            "thread {id} registered, stack {:#x}..{:#x}",
            stack.base(),
            stack.top()
        );

        self.blocks.push(ControlBlock::new(id, stack, entry));
        self.current = Some(self.blocks.len() - 1);
        Ok(id)
    }

    /// Get the number of threads
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Get a control block by vector index
    pub fn get(&self, index: usize) -> Option<&ControlBlock<'a>> {
        self.blocks.get(index)
    }

    /// Get the vector index of a thread
    pub fn position_of(&self, id: ThreadId) -> Option<usize> {
        self.blocks.iter().position(|block| block.id == id)
    }

    /// Get the scan anchor
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Move the scan anchor
    pub fn set_current(&mut self, index: usize) {
        debug_assert!(index < self.blocks.len());
        self.current = Some(index);
    }

    /// Clear the scan anchor so the next scan starts at the list head
    pub fn reset_anchor(&mut self) {
        self.current = None;
    }

    /// Find the next thread to dispatch
    ///
    /// Scans list order starting right after the anchor (or at the head if
    /// there is none), wrapping once around the table.
    ///
    /// # Returns
    ///
    /// The vector index of the first `Init` or `Sleeping` thread, or `None`
    /// if a full cycle finds nothing runnable
    pub fn candidate(&self) -> Option<usize> {
        let len = self.blocks.len();
        let start = match self.current {
            Some(index) => list_position(len, index) + 1,
            None => 0,
        };

        (0..len)
            .map(|step| list_index(len, (start + step) % len))
            .find(|&index| self.blocks[index].status.is_runnable())
    }

    /// Get a raw pointer to a control block
    ///
    /// Valid until the table is modified or dropped.
    pub(crate) fn block_ptr(&mut self, index: usize) -> *mut ControlBlock<'a> {
        &mut self.blocks[index]
    }

    /// Release every stack and control block
    ///
    /// # Returns
    ///
    /// One report per thread, in registration order
    pub fn teardown(&mut self) -> Vec<ThreadReport> {
        let mut reports = Vec::with_capacity(self.blocks.len());
        for block in self.blocks.drain(..) {
            let ControlBlock { id, stack, entry, stats, outcome, .. } = block;
            drop(entry);
            // SAFETY: the stack came from this allocator and no context
            // runs on it any more
            unsafe { stack.release(&self.allocator) };
            reports.push(ThreadReport { id, stats, outcome });
        }
        self.current = None;
        reports
    }
}

impl<'a, A: StackAllocator> Drop for ThreadTable<'a, A> {
    fn drop(&mut self) {
        if !self.blocks.is_empty() {
            debug!("releasing {} threads that never ran", self.blocks.len());
            self.teardown();
        }
    }
}

/// List position of vector index `index`
fn list_position(len: usize, index: usize) -> usize {
    len - 1 - index
}

/// Vector index of list position `position`
fn list_index(len: usize, position: usize) -> usize {
    len - 1 - position
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Logical-thread stacks
//!
//! # Layout
//!
//! ```text
//! raw                base (page aligned)              base + size    raw + raw_len
//!  |<-- < page -->|<------------- size --------------->|<-- rest -->|
//!                  ^ lowest usable byte        top (initial rsp) ^
//! ```
//!
//! The allocation is `size + page_size` bytes, so a page-aligned region of
//! exactly `size` bytes always fits inside it. The raw handle is kept
//! because the aligned base generally differs from what the allocator
//! returned.

use core::ptr::NonNull;
use std::alloc::{self, Layout};

use x86_64::structures::paging::{PageSize, Size4KiB};

use crate::error::{Result, SchedulerError};
use crate::traits::StackAllocator;

/// Minimum alignment requested from the global allocator
pub const STACK_ALIGN: usize = 16;

/// Get the platform page size
///
/// Falls back to the 4 KiB base page size if `sysconf` reports nonsense.
pub fn page_size() -> usize {
    // SAFETY: sysconf has no memory-safety preconditions
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    match usize::try_from(raw) {
        Ok(size) if size.is_power_of_two() => size,
        _ => Size4KiB::SIZE as usize,
    }
}

/// Stack memory from the global Rust allocator
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemStackAllocator;

impl StackAllocator for SystemStackAllocator {
    fn allocate(&self, len: usize) -> Option<NonNull<u8>> {
        let layout = Layout::from_size_align(len, STACK_ALIGN).ok()?;
        if layout.size() == 0 {
            return None;
        }
        // SAFETY: the layout has a non-zero size
        NonNull::new(unsafe { alloc::alloc(layout) })
    }

    unsafe fn release(&self, ptr: NonNull<u8>, len: usize) {
        // The layout was valid when the block was allocated
        if let Ok(layout) = Layout::from_size_align(len, STACK_ALIGN) {
            alloc::dealloc(ptr.as_ptr(), layout);
        }
    }
}

/// A page-aligned private stack
///
/// A `Stack` does not release itself on drop: it only knows the allocator
/// through its owner, which must call [`Stack::release`] exactly once.
#[derive(Debug)]
pub struct Stack {
    /// Pointer returned by the allocator
    raw: NonNull<u8>,
    /// Length passed to the allocator
    raw_len: usize,
    /// Page-aligned lowest usable address
    base: usize,
    /// Usable bytes starting at `base`
    size: usize,
}

impl Stack {
    /// Allocate and align a stack of `size` usable bytes
    ///
    /// # Arguments
    ///
    /// * `allocator` - Memory provider
    /// * `size` - Usable stack bytes
    /// * `page` - Required alignment of the usable base (a power of two)
    ///
    /// # Returns
    ///
    /// * `Ok(Stack)` - The aligned stack
    /// * `Err(StackAlloc)` - The allocator had no memory
    /// * `Err(StackAlign)` - No aligned region fits; the allocation has
    ///   already been released
    pub fn allocate<A: StackAllocator + ?Sized>(
        allocator: &A,
        size: usize,
        page: usize,
    ) -> Result<Self> {
        debug_assert!(page.is_power_of_two());

        let raw_len = size
            .checked_add(page)
            .ok_or(SchedulerError::StackAlloc { size })?;
        let raw = allocator
            .allocate(raw_len)
            .ok_or(SchedulerError::StackAlloc { size: raw_len })?;

        match Self::aligned_base(raw.as_ptr() as usize, raw_len, size, page) {
            Some(base) => Ok(Self { raw, raw_len, base, size }),
            None => {
                // SAFETY: `raw` was just returned for `raw_len` bytes
                unsafe { allocator.release(raw, raw_len) };
                Err(SchedulerError::StackAlign {
                    base: raw.as_ptr() as usize,
                    align: page,
                })
            }
        }
    }

    /// Find the page-aligned base of a `size`-byte region inside
    /// `[raw, raw + raw_len)`
    ///
    /// Plain address arithmetic: user addresses are not canonicalized.
    fn aligned_base(raw: usize, raw_len: usize, size: usize, page: usize) -> Option<usize> {
        let end = raw.checked_add(raw_len)?;
        let base = raw.checked_add(page - 1)? & !(page - 1);
        let limit = base.checked_add(size)?;
        (limit <= end).then_some(base)
    }

    /// Get the page-aligned lowest usable address
    pub fn base(&self) -> usize {
        self.base
    }

    /// Get the top of the stack (stack grows down)
    pub fn top(&self) -> usize {
        self.base + self.size
    }

    /// Get the usable size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Check whether `addr` lies in the usable region
    pub fn contains(&self, addr: usize) -> bool {
        (self.base..self.top()).contains(&addr)
    }

    /// Return the memory to its allocator
    ///
    /// # Safety
    ///
    /// `allocator` must be the allocator this stack came from, and no
    /// context may still be executing on the stack.
    pub unsafe fn release<A: StackAllocator + ?Sized>(self, allocator: &A) {
        allocator.release(self.raw, self.raw_len);
    }
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Allocator traits
//!
//! This module defines the allocator interface used to provision
//! logical-thread stacks.
//!
//! The scheduler never assumes anything about the alignment of the
//! returned memory; see [`crate::mm::Stack`] for how a page-aligned region
//! is carved out of whatever the allocator hands back.

use core::ptr::NonNull;

/// Trait for stack memory providers
///
/// This trait provides a unified interface for the memory behind
/// logical-thread stacks:
/// - [`crate::mm::SystemStackAllocator`]: the global Rust allocator
/// - test allocators: counting, failing, or deliberately misaligned
pub trait StackAllocator {
    /// Allocate `len` bytes
    ///
    /// # Arguments
    /// * `len` - Number of bytes requested (never zero)
    ///
    /// # Returns
    /// * `Some(ptr)` pointing to at least `len` writable bytes
    /// * `None` if the request cannot be satisfied
    fn allocate(&self, len: usize) -> Option<NonNull<u8>>;

    /// Release memory previously returned by [`StackAllocator::allocate`]
    ///
    /// # Arguments
    /// * `ptr` - The exact pointer returned by `allocate`
    /// * `len` - The length passed to `allocate`
    ///
    /// # Safety
    ///
    /// `ptr` and `len` must come from a single earlier call to `allocate`
    /// on this allocator, and the memory must not be released twice.
    unsafe fn release(&self, ptr: NonNull<u8>, len: usize);
}

impl<A: StackAllocator + ?Sized> StackAllocator for &A {
    fn allocate(&self, len: usize) -> Option<NonNull<u8>> {
        (**self).allocate(len)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, len: usize) {
        (**self).release(ptr, len)
    }
}

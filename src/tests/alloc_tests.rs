// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Stack Provisioning Tests
//!
//! Drives full runs through instrumented allocators to check that every
//! stack is released exactly once and that alignment never depends on
//! what the allocator returns.

use core::cell::Cell;
use core::ptr::NonNull;
use std::cell::RefCell;

use crate::error::SchedulerError;
use crate::mm::{page_size, SystemStackAllocator};
use crate::sched::thread::fail_next_entry_alloc;
use crate::sched::{current_stack, yield_now, Scheduler};
use crate::traits::StackAllocator;
use crate::SchedulerConfig;

use super::init_logging;

const STACK: usize = 32 * 1024;

fn cooperative() -> SchedulerConfig {
    SchedulerConfig::new().stack_size(STACK).preemption(false)
}

/// Counts allocations and releases
#[derive(Default)]
struct CountingAllocator {
    allocs: Cell<usize>,
    releases: Cell<usize>,
    bytes: Cell<usize>,
}

impl StackAllocator for CountingAllocator {
    fn allocate(&self, len: usize) -> Option<NonNull<u8>> {
        let ptr = SystemStackAllocator.allocate(len)?;
        self.allocs.set(self.allocs.get() + 1);
        self.bytes.set(self.bytes.get() + len);
        Some(ptr)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, len: usize) {
        self.releases.set(self.releases.get() + 1);
        self.bytes.set(self.bytes.get() - len);
        SystemStackAllocator.release(ptr, len)
    }
}

/// Hands out pointers at an odd offset into a larger block
struct SkewedAllocator {
    skew: usize,
}

impl StackAllocator for SkewedAllocator {
    fn allocate(&self, len: usize) -> Option<NonNull<u8>> {
        let ptr = SystemStackAllocator.allocate(len + self.skew)?;
        // SAFETY: the block is `skew` bytes longer than requested
        NonNull::new(unsafe { ptr.as_ptr().add(self.skew) })
    }

    unsafe fn release(&self, ptr: NonNull<u8>, len: usize) {
        if let Some(raw) = NonNull::new(ptr.as_ptr().sub(self.skew)) {
            SystemStackAllocator.release(raw, len + self.skew);
        }
    }
}

#[test]
fn test_teardown_releases_every_stack() {
    init_logging();
    let allocator = CountingAllocator::default();
    let mut scheduler = Scheduler::with_allocator(cooperative(), &allocator).unwrap();
    for rounds in 0..5usize {
        scheduler
            .spawn(move || {
                for _ in 0..rounds {
                    yield_now();
                }
            })
            .unwrap();
    }
    assert_eq!(allocator.allocs.get(), 5);
    assert_eq!(allocator.releases.get(), 0);

    let summary = scheduler.run().unwrap();
    assert!(summary.all_completed());
    assert_eq!(allocator.allocs.get(), 5);
    assert_eq!(allocator.releases.get(), 5);
    assert_eq!(allocator.bytes.get(), 0);
}

#[test]
fn test_dropped_scheduler_releases_stacks() {
    let allocator = CountingAllocator::default();
    let ran = Cell::new(false);
    {
        let mut scheduler = Scheduler::with_allocator(cooperative(), &allocator).unwrap();
        scheduler.spawn(|| ran.set(true)).unwrap();
        scheduler.spawn(|| ran.set(true)).unwrap();
    }
    assert!(!ran.get());
    assert_eq!(allocator.allocs.get(), 2);
    assert_eq!(allocator.releases.get(), 2);
}

#[test]
fn test_skewed_allocations_are_aligned() {
    init_logging();
    let page = page_size();
    for skew in [1usize, 3, 8, 17, 4095] {
        let allocator = SkewedAllocator { skew };
        let stacks = RefCell::new(Vec::new());
        let mut scheduler = Scheduler::with_allocator(cooperative(), &allocator).unwrap();
        for _ in 0..3 {
            scheduler
                .spawn(|| {
                    yield_now();
                    stacks.borrow_mut().push(current_stack());
                })
                .unwrap();
        }

        let summary = scheduler.run().unwrap();
        assert!(summary.all_completed());
        for stack in stacks.borrow().iter() {
            let stack = stack.clone().unwrap();
            assert_eq!(stack.start % page, 0, "skew {skew}");
            assert_eq!(stack.len(), STACK);
        }
    }
}

#[test]
fn test_registration_failure_keeps_earlier_threads() {
    struct Refusing<'a> {
        inner: &'a CountingAllocator,
        limit: usize,
    }

    impl StackAllocator for Refusing<'_> {
        fn allocate(&self, len: usize) -> Option<NonNull<u8>> {
            if self.inner.allocs.get() >= self.limit {
                return None;
            }
            self.inner.allocate(len)
        }

        unsafe fn release(&self, ptr: NonNull<u8>, len: usize) {
            self.inner.release(ptr, len)
        }
    }

    let counting = CountingAllocator::default();
    let allocator = Refusing { inner: &counting, limit: 2 };
    let runs = Cell::new(0);
    let mut scheduler = Scheduler::with_allocator(cooperative(), allocator).unwrap();

    scheduler.spawn(|| runs.set(runs.get() + 1)).unwrap();
    scheduler.spawn(|| runs.set(runs.get() + 1)).unwrap();
    let err = scheduler.spawn(|| runs.set(runs.get() + 100)).unwrap_err();
    assert!(matches!(err, SchedulerError::StackAlloc { .. }));
    assert_eq!(scheduler.thread_count(), 2);

    let summary = scheduler.run().unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(summary.len(), 2);
    assert_eq!(counting.releases.get(), 2);
}

#[test]
fn test_entry_allocation_failure_rolls_back() {
    let allocator = CountingAllocator::default();
    let runs = Cell::new(0);
    let mut scheduler = Scheduler::with_allocator(cooperative(), &allocator).unwrap();
    scheduler.spawn(|| runs.set(runs.get() + 1)).unwrap();

    fail_next_entry_alloc();
    let err = scheduler.spawn(|| runs.set(runs.get() + 100)).unwrap_err();
    assert!(matches!(err, SchedulerError::ControlBlockAlloc));
    // No stack was taken for the rejected thread
    assert_eq!(scheduler.thread_count(), 1);
    assert_eq!(allocator.allocs.get(), 1);

    scheduler.spawn(|| runs.set(runs.get() + 1)).unwrap();
    let summary = scheduler.run().unwrap();
    assert_eq!(runs.get(), 2);
    assert_eq!(summary.len(), 2);
    assert_eq!(allocator.releases.get(), 2);
}

#[test]
fn test_stats_after_run() {
    let mut scheduler = Scheduler::with_config(cooperative()).unwrap();
    let id = scheduler
        .spawn(|| {
            for _ in 0..3 {
                yield_now();
            }
        })
        .unwrap();

    let summary = scheduler.run().unwrap();
    let report = summary.get(id).unwrap();
    assert_eq!(report.stats.schedule_count, 4);
    assert_eq!(report.stats.voluntary_switches, 3);
    assert_eq!(report.stats.involuntary_switches, 0);
    assert!(summary.all_completed());
}

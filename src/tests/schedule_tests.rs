// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Scheduling Order Tests
//!
//! All tests here run cooperatively (no timer), so the dispatch order is
//! fully determined by the round-robin policy.

use core::ops::Range;
use std::cell::RefCell;

use proptest::prelude::*;

use crate::sched::{current_stack, yield_now, Scheduler};
use crate::SchedulerConfig;

use super::init_logging;

fn cooperative() -> SchedulerConfig {
    SchedulerConfig::new().stack_size(64 * 1024).preemption(false)
}

/// Run one thread per entry of `yields`; thread `i` records `i` on every
/// dispatch and yields `yields[i]` times
fn dispatch_order(yields: &[usize]) -> Vec<usize> {
    let trace = RefCell::new(Vec::new());
    let mut scheduler = Scheduler::with_config(cooperative()).unwrap();

    for (index, &count) in yields.iter().enumerate() {
        let trace = &trace;
        scheduler
            .spawn(move || {
                trace.borrow_mut().push(index);
                for _ in 0..count {
                    yield_now();
                    trace.borrow_mut().push(index);
                }
            })
            .unwrap();
    }

    let summary = scheduler.run().unwrap();
    assert!(summary.all_completed());
    assert_eq!(summary.len(), yields.len());
    trace.into_inner()
}

/// Reference round-robin over a newest-first list
fn model_order(yields: &[usize]) -> Vec<usize> {
    let len = yields.len();
    let mut left: Vec<Option<usize>> = yields.iter().map(|&k| Some(k)).collect();
    let list: Vec<usize> = (0..len).rev().collect();
    let mut next = 0;
    let mut order = Vec::new();

    while let Some(pos) = (0..len)
        .map(|step| (next + step) % len)
        .find(|&pos| left[list[pos]].is_some())
    {
        let thread = list[pos];
        order.push(thread);
        left[thread] = match left[thread] {
            Some(0) | None => None,
            Some(k) => Some(k - 1),
        };
        next = pos + 1;
    }
    order
}

#[test]
fn test_every_thread_runs_once() {
    init_logging();
    for count in 0..=8 {
        let runs = RefCell::new(vec![0usize; count]);
        let mut scheduler = Scheduler::with_config(cooperative()).unwrap();
        for index in 0..count {
            let runs = &runs;
            scheduler.spawn(move || runs.borrow_mut()[index] += 1).unwrap();
        }
        assert_eq!(scheduler.thread_count(), count);

        let summary = scheduler.run().unwrap();
        assert_eq!(summary.len(), count);
        assert!(runs.borrow().iter().all(|&n| n == 1));
    }
}

#[test]
fn test_round_robin_order() {
    init_logging();
    // Registered as T1 (5 yields), T2 (3 yields), T3 (none); the newest
    // registration runs first
    let order = dispatch_order(&[5, 3, 0]);
    assert_eq!(order, [2, 1, 0, 1, 0, 1, 0, 1, 0, 0, 0]);
}

#[test]
fn test_single_thread_redispatched() {
    let order = dispatch_order(&[4]);
    assert_eq!(order, [0; 5]);
}

#[test]
fn test_stack_isolation() {
    init_logging();
    const THREADS: usize = 4;
    const WORDS: usize = 256;

    let ranges: RefCell<Vec<Range<usize>>> = RefCell::new(Vec::new());
    let intact = RefCell::new(Vec::new());
    let mut scheduler = Scheduler::with_config(cooperative()).unwrap();

    for index in 0..THREADS {
        let (ranges, intact) = (&ranges, &intact);
        scheduler
            .spawn(move || {
                let pattern = 0xA5A5_0000_0000_0000u64 | index as u64;
                let sentinel = [pattern; WORDS];
                let stack = current_stack().unwrap();
                assert!(stack.contains(&(sentinel.as_ptr() as usize)));
                ranges.borrow_mut().push(stack);

                let mut ok = true;
                for _ in 0..10 {
                    yield_now();
                    let words = core::hint::black_box(&sentinel);
                    ok &= words.iter().all(|&word| word == pattern);
                }
                intact.borrow_mut().push(ok);
            })
            .unwrap();
    }

    scheduler.run().unwrap();

    assert_eq!(*intact.borrow(), [true; THREADS]);
    let ranges = ranges.borrow();
    for (i, a) in ranges.iter().enumerate() {
        for b in ranges.iter().skip(i + 1) {
            assert!(a.end <= b.start || b.end <= a.start, "stacks overlap");
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_round_robin_matches_model(yields in prop::collection::vec(0usize..6, 0..6)) {
        prop_assert_eq!(dispatch_order(&yields), model_order(&yields));
    }

    #[test]
    fn prop_no_thread_skipped_twice(yields in prop::collection::vec(0usize..6, 2..6)) {
        let order = dispatch_order(&yields);
        // Between two dispatches of the same thread, every other thread is
        // dispatched at most once
        for (i, &thread) in order.iter().enumerate() {
            if let Some(gap) = order[i + 1..].iter().position(|&t| t == thread) {
                let between = &order[i + 1..i + 1 + gap];
                for other in 0..yields.len() {
                    prop_assert!(between.iter().filter(|&&t| t == other).count() <= 1);
                }
            }
        }
    }
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Integration Tests
//!
//! This module contains end-to-end tests of the scheduler: ordering,
//! stack isolation, resource accounting and timer preemption.

mod alloc_tests;
mod schedule_tests;

use std::sync::{Mutex, MutexGuard};

/// Route `log` output through the test harness
pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Serialize tests that touch the process-wide preemption signal
pub(crate) fn signal_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

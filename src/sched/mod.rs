// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Scheduler and thread management
//!
//! This module provides the green-thread scheduler: control blocks, the
//! thread table with its round-robin traversal, and the scheduler loop.
//!
//! # Example
//! ```ignore
//! use greensched::sched::{Scheduler, yield_now};
//!
//! let mut scheduler = Scheduler::new();
//! scheduler.spawn(|| yield_now())?;
//! scheduler.run()?;
//! ```

pub mod scheduler;
pub mod state;
pub mod table;
pub mod thread;

pub use scheduler::{current, current_stack, no_preempt, yield_now, RunSummary, Scheduler};
pub use state::ThreadState;
pub use table::{ThreadReport, ThreadTable};
pub use thread::{ControlBlock, EntryPoint, ThreadId, ThreadOutcome, ThreadStats};

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! # greensched - user-level green threads
//!
//! greensched multiplexes several logical threads onto the calling OS
//! thread. Each logical thread runs on its own page-aligned stack, gives up
//! the CPU with [`yield_now`], and is forcibly preempted by a per-thread
//! POSIX timer when it does not.
//!
//! ## Architecture
//!
//! ```text
//! src/
//! ├── arch/amd64/        # Context capture/restore (x86_64 System V)
//! ├── mm/                # Stack provisioning and page alignment
//! ├── sched/             # Control blocks, thread table, scheduler loop
//! ├── object/            # Preemption timer object
//! ├── interrupt/         # SIGALRM handler installation and forced yield
//! ├── sync/              # Preemption mask flags
//! ├── config.rs          # Scheduler configuration
//! ├── error.rs           # Error type
//! └── traits.rs          # Stack allocator trait
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use greensched::{Scheduler, yield_now};
//!
//! let mut scheduler = Scheduler::new();
//! scheduler.spawn(|| {
//!     for _ in 0..3 {
//!         yield_now();
//!     }
//! })?;
//! let summary = scheduler.run()?;
//! assert!(summary.all_completed());
//! ```

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
compile_error!("greensched supports x86_64 Linux only");

// Core traits and types
pub mod traits;

// Error and configuration
pub mod config;
pub mod error;

// Architecture-specific context switching
pub mod arch;

// Stack management
pub mod mm;

// Preemption masking
pub mod sync;

// Timer objects
pub mod object;

// Signal-driven preemption
pub mod interrupt;

// Scheduler and thread management
pub mod sched;

#[cfg(test)]
mod tests;

pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use mm::{page_size, Stack, SystemStackAllocator};
pub use sched::{
    current, current_stack, no_preempt, yield_now, EntryPoint, RunSummary, Scheduler,
    ThreadId, ThreadOutcome, ThreadReport, ThreadState, ThreadStats,
};
pub use traits::StackAllocator;

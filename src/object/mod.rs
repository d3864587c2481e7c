// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! OS-backed objects
//!
//! Thin owners around operating system resources the scheduler holds for
//! the duration of a run. Each object releases its resource on drop.
//!
//! # Modules
//!
//! - [`timer`] - Preemption timer objects

pub mod timer;

// Re-exports
pub use timer::{PreemptionTimer, TimerState};

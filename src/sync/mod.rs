// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Synchronization Primitives
//!
//! Logical threads never run in parallel, so the only synchronization the
//! scheduler needs is between its own code and the preemption signal
//! handler, which interrupts it on the same OS thread.
//!
//! # Primitives
//!
//! - **PreemptState**: atomic flag set masking preemption during critical
//!   sections

pub mod preempt;

// Re-exports
pub use preempt::{PreemptFlags, PreemptState};

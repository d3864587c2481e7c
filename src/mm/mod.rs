// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Memory management
//!
//! Stack provisioning for logical threads. Every stack is carved out of a
//! slightly larger allocation so that its usable base lands on a page
//! boundary no matter where the allocator placed the block.

pub mod stack;

pub use stack::{page_size, Stack, SystemStackAllocator, STACK_ALIGN};

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Preemption Mask
//!
//! The software equivalent of disabling interrupts. While `MASKED` is set,
//! a timer firing only records itself in `DEFERRED` and returns; it never
//! enters the yield machinery.
//!
//! `MASKED` is set whenever the scheduler loop holds control and for the
//! whole voluntary or forced yield path. Only code running on a logical
//! thread clears it, after a switch has landed there.

use core::sync::atomic::{AtomicU8, Ordering};

use bitflags::bitflags;

bitflags! {
    /// Preemption state bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PreemptFlags: u8 {
        /// Timer firings must not yield
        const MASKED = 1 << 0;
        /// A firing arrived while masked
        const DEFERRED = 1 << 1;
    }
}

/// Atomic preemption flags of one scheduler instance
///
/// Accessed from normal code and from the signal handler on the same OS
/// thread, so plain atomics are enough.
#[derive(Debug)]
pub struct PreemptState {
    bits: AtomicU8,
}

impl PreemptState {
    /// Create a state with the given flags
    pub const fn new(flags: PreemptFlags) -> Self {
        Self {
            bits: AtomicU8::new(flags.bits()),
        }
    }

    /// Get the current flags
    pub fn flags(&self) -> PreemptFlags {
        PreemptFlags::from_bits_truncate(self.bits.load(Ordering::SeqCst))
    }

    /// Check if preemption is masked
    pub fn is_masked(&self) -> bool {
        self.flags().contains(PreemptFlags::MASKED)
    }

    /// Mask preemption
    ///
    /// # Returns
    ///
    /// `true` if this call set the mask, `false` if it was already set.
    /// Only the caller that set the mask may clear it.
    pub fn mask(&self) -> bool {
        let prev = self.bits.fetch_or(PreemptFlags::MASKED.bits(), Ordering::SeqCst);
        !PreemptFlags::from_bits_truncate(prev).contains(PreemptFlags::MASKED)
    }

    /// Clear the mask
    ///
    /// # Returns
    ///
    /// `true` if a firing was deferred while masked
    pub fn unmask(&self) -> bool {
        let clear = PreemptFlags::MASKED | PreemptFlags::DEFERRED;
        let prev = self.bits.fetch_and(!clear.bits(), Ordering::SeqCst);
        PreemptFlags::from_bits_truncate(prev).contains(PreemptFlags::DEFERRED)
    }

    /// Record a firing that arrived while masked
    pub fn defer(&self) {
        self.bits.fetch_or(PreemptFlags::DEFERRED.bits(), Ordering::SeqCst);
    }
}

impl Default for PreemptState {
    fn default() -> Self {
        Self::new(PreemptFlags::MASKED)
    }
}

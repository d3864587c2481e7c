// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Execution Context Switch
//!
//! This module provides the Rust interface to the low-level context
//! switch routine. A [`Context`] holds everything the System V ABI
//! requires a callee to preserve; the caller-saved registers are already
//! spilled by the compiler around the call to [`switch`].
//!
//! When preemption suspends a thread from inside a signal handler, the
//! kernel has already stored the full register file in the signal frame
//! on the thread's own stack, so the same small context suffices.

use core::arch::global_asm;

use x86_64::align_down;

/// Default MXCSR: all exceptions masked, round to nearest
const MXCSR_DEFAULT: u32 = 0x1F80;

/// Default x87 control word: all exceptions masked, 64-bit precision
const FPU_CW_DEFAULT: u16 = 0x037F;

/// Function a fresh context starts in
///
/// Receives the two words passed to [`Context::bootstrap`] and must never
/// return: there is no frame to return to.
pub type StartFn = extern "C" fn(usize, usize) -> !;

/// ============================================================================
/// Assembly Context Switch Function
/// ============================================================================

// greensched_switch(save: rdi, restore: rsi)
//
// The return address is on the stack at entry, so saving rsp captures the
// resume point; `ret` on the restored stack continues there.
//
// greensched_bootstrap is the first "return address" of a fresh context.
// It enters with rsp 16-byte aligned and calls rbx(r12, r13).
global_asm!(
    ".text",
    ".global greensched_switch",
    ".type greensched_switch, @function",
    ".p2align 4",
    "greensched_switch:",
    "mov qword ptr [rdi + 0x00], rsp",
    "mov qword ptr [rdi + 0x08], rbp",
    "mov qword ptr [rdi + 0x10], rbx",
    "mov qword ptr [rdi + 0x18], r12",
    "mov qword ptr [rdi + 0x20], r13",
    "mov qword ptr [rdi + 0x28], r14",
    "mov qword ptr [rdi + 0x30], r15",
    "stmxcsr dword ptr [rdi + 0x38]",
    "fnstcw word ptr [rdi + 0x3c]",
    "mov rsp, qword ptr [rsi + 0x00]",
    "mov rbp, qword ptr [rsi + 0x08]",
    "mov rbx, qword ptr [rsi + 0x10]",
    "mov r12, qword ptr [rsi + 0x18]",
    "mov r13, qword ptr [rsi + 0x20]",
    "mov r14, qword ptr [rsi + 0x28]",
    "mov r15, qword ptr [rsi + 0x30]",
    "ldmxcsr dword ptr [rsi + 0x38]",
    "fldcw word ptr [rsi + 0x3c]",
    "ret",
    ".size greensched_switch, . - greensched_switch",
    "",
    ".global greensched_bootstrap",
    ".type greensched_bootstrap, @function",
    ".p2align 4",
    "greensched_bootstrap:",
    "xor ebp, ebp",
    "mov rdi, r12",
    "mov rsi, r13",
    "call rbx",
    "ud2",
    ".size greensched_bootstrap, . - greensched_bootstrap",
);

extern "C" {
    fn greensched_switch(save: *mut Context, restore: *const Context);
    fn greensched_bootstrap();
}

/// ============================================================================
/// Saved Context
/// ============================================================================

/// Saved CPU state of a suspended execution context
///
/// Field offsets are fixed by the assembly above.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Context {
    /// Stack pointer (points at the resume address)
    rsp: u64,
    /// Frame pointer
    rbp: u64,
    /// Callee-saved general purpose registers
    rbx: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
    /// SSE control/status
    mxcsr: u32,
    /// x87 control word
    fpu_cw: u16,
    _pad: u16,
}

impl Context {
    /// Create an empty context
    ///
    /// An empty context is only ever written by [`switch`]; resuming it
    /// before that is a fatal precondition violation.
    pub const fn empty() -> Self {
        Self {
            rsp: 0,
            rbp: 0,
            rbx: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            mxcsr: MXCSR_DEFAULT,
            fpu_cw: FPU_CW_DEFAULT,
            _pad: 0,
        }
    }

    /// Prepare the first activation of a context on a private stack
    ///
    /// Resuming the returned context calls `start(arg0, arg1)` with the
    /// stack pointer at `top` (rounded down to 16 bytes).
    ///
    /// # Arguments
    ///
    /// * `top` - One past the highest usable stack byte
    /// * `start` - Entry function, must never return
    /// * `arg0`, `arg1` - Words handed to `start`
    ///
    /// # Safety
    ///
    /// The 8 bytes below `top` must be writable and the stack must stay
    /// valid for as long as the context can run.
    pub unsafe fn bootstrap(top: usize, start: StartFn, arg0: usize, arg1: usize) -> Self {
        let top = align_down(top as u64, 16);

        // Stack layout:
        // [top - 8]  greensched_bootstrap  <- rsp, consumed by `ret`
        let rsp = top - 8;
        (rsp as *mut u64).write(greensched_bootstrap as usize as u64);

        Self {
            rsp,
            rbx: start as usize as u64,
            r12: arg0 as u64,
            r13: arg1 as u64,
            ..Self::empty()
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::empty()
    }
}

/// ============================================================================
/// High-Level Context Switch API
/// ============================================================================

/// Switch from the running context to another
///
/// Saves the current CPU state into `save` and resumes `restore`. The call
/// returns once some other context switches back to `save`.
///
/// # Safety
///
/// - `save` must be valid for writes and `restore` for reads
/// - `restore` must hold a context produced by [`Context::bootstrap`] or
///   by an earlier `switch`, whose stack is still alive
/// - no references derived from `save` or `restore` may be live across
///   the call
pub unsafe fn switch(save: *mut Context, restore: *const Context) {
    greensched_switch(save, restore);
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Scheduler implementation
//!
//! Provides the round-robin scheduler loop, the yield paths and the
//! thread-start trampoline.
//!
//! # Control flow
//!
//! [`Scheduler::run`] owns the master context. Each iteration asks the
//! table for a candidate and switches onto it; the thread runs until it
//! yields, is preempted or returns, and every one of those paths switches
//! back to the master context, which continues the loop. Once no candidate
//! is left the timer is dropped and every stack is released.
//!
//! The run-time state lives in an [`Executor`] on `run()`'s stack. A
//! thread-local pointer to it lets [`yield_now`] and the preemption handler
//! find the scheduler of the calling OS thread without any global state.

use core::cell::Cell;
use core::ops::Range;
use core::ptr;
use std::panic::{self, AssertUnwindSafe};

use log::{info, warn};

use crate::arch::{self, Context};
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::interrupt::{self, UnblockGuard};
use crate::mm::{page_size, SystemStackAllocator};
use crate::object::PreemptionTimer;
use crate::sync::{PreemptFlags, PreemptState};
use crate::traits::StackAllocator;

use super::state::ThreadState;
use super::table::{ThreadReport, ThreadTable};
use super::thread::{boxed_entry, ControlBlock, EntryPoint, ThreadId, ThreadOutcome, ThreadStats};

/// ============================================================================
/// Run-time State
/// ============================================================================

thread_local! {
    /// Executor of the scheduler running on this OS thread
    static ACTIVE: Cell<*mut Executor> = const { Cell::new(ptr::null_mut()) };
}

/// Get the active executor, or null
///
/// Safe to call from the signal handler: the thread-local is
/// const-initialized and has no destructor.
fn active() -> *mut Executor {
    ACTIVE.try_with(Cell::get).unwrap_or(ptr::null_mut())
}

/// Run-time half of the scheduler state
///
/// Only one context touches it at a time: the master context, or the
/// running logical thread (including its signal handler).
struct Executor {
    /// Context of the scheduler loop
    master: Context,
    /// Preemption mask
    preempt: PreemptState,
    /// Preemption timer (absent for cooperative runs)
    timer: Option<PreemptionTimer>,
    /// Running thread, null while the master context holds control
    running: *mut ControlBlock<'static>,
    /// Dispatches whose time slice could not be armed
    arm_failures: u64,
}

impl Executor {
    fn new(timer: Option<PreemptionTimer>) -> Self {
        Self {
            master: Context::empty(),
            preempt: PreemptState::new(PreemptFlags::MASKED),
            timer,
            running: ptr::null_mut(),
            arm_failures: 0,
        }
    }
}

/// Publishes an executor in [`ACTIVE`] for the guard's lifetime
struct ActiveGuard;

impl ActiveGuard {
    fn enter(exec: *mut Executor) -> Self {
        ACTIVE.with(|active| active.set(exec));
        Self
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let _ = ACTIVE.try_with(|active| active.set(ptr::null_mut()));
    }
}

/// ============================================================================
/// Run Summary
/// ============================================================================

/// What happened during a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// One report per thread, in registration order
    pub threads: Vec<ThreadReport>,
}

impl RunSummary {
    /// Get the number of threads that ran
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Check if no thread was registered
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Get the report of one thread
    pub fn get(&self, id: ThreadId) -> Option<&ThreadReport> {
        self.threads.iter().find(|report| report.id == id)
    }

    /// Check if every entry function returned normally
    pub fn all_completed(&self) -> bool {
        self.threads
            .iter()
            .all(|report| report.outcome == Some(ThreadOutcome::Completed))
    }

    /// Iterate over threads whose entry panicked
    pub fn panicked(&self) -> impl Iterator<Item = &ThreadReport> {
        self.threads
            .iter()
            .filter(|report| matches!(report.outcome, Some(ThreadOutcome::Panicked(_))))
    }

    /// Sum the statistics of all threads
    pub fn total_stats(&self) -> ThreadStats {
        self.threads.iter().fold(ThreadStats::default(), |mut acc, report| {
            acc.schedule_count += report.stats.schedule_count;
            acc.voluntary_switches += report.stats.voluntary_switches;
            acc.involuntary_switches += report.stats.involuntary_switches;
            acc
        })
    }
}

/// ============================================================================
/// Scheduler
/// ============================================================================

/// Green-thread scheduler
///
/// Collects threads during registration; [`Scheduler::run`] consumes it,
/// so the set of threads is fixed once they start running. Entry closures
/// may borrow from the caller for `'a`.
pub struct Scheduler<'a, A: StackAllocator = SystemStackAllocator> {
    /// All registered threads
    table: ThreadTable<'a, A>,
    /// Scheduling policy
    config: SchedulerConfig,
}

impl<'a> Scheduler<'a, SystemStackAllocator> {
    /// Create a scheduler with the default configuration
    pub fn new() -> Self {
        Self::build(SchedulerConfig::default(), SystemStackAllocator)
    }

    /// Create a scheduler with a custom configuration
    pub fn with_config(config: SchedulerConfig) -> Result<Self> {
        Self::with_allocator(config, SystemStackAllocator)
    }
}

impl<'a> Default for Scheduler<'a, SystemStackAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, A: StackAllocator> Scheduler<'a, A> {
    /// Create a scheduler whose stacks come from `allocator`
    pub fn with_allocator(config: SchedulerConfig, allocator: A) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, allocator))
    }

    fn build(config: SchedulerConfig, allocator: A) -> Self {
        Self {
            table: ThreadTable::new(allocator, config.stack_size, page_size()),
            config,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Get the number of registered threads
    pub fn thread_count(&self) -> usize {
        self.table.len()
    }

    /// Schedule `entry(arg)` to run once on its own stack
    ///
    /// # Returns
    ///
    /// * `Ok(id)` - The new thread's ID
    /// * `Err(_)` - Allocation failed; nothing was registered
    pub fn register(&mut self, entry: EntryPoint, arg: usize) -> Result<ThreadId> {
        self.spawn(move || entry(arg))
    }

    /// Schedule a closure to run once on its own stack
    ///
    /// # Returns
    ///
    /// * `Ok(id)` - The new thread's ID
    /// * `Err(ControlBlockAlloc | StackAlloc | StackAlign)` - Allocation
    ///   failed; nothing was registered
    pub fn spawn<F>(&mut self, f: F) -> Result<ThreadId>
    where
        F: FnOnce() + 'a,
    {
        let registered = boxed_entry(f).and_then(|entry| self.table.register(entry));
        registered.map_err(|err| {
            warn!("thread registration failed: {err}");
            err
        })
    }

    /// Run every registered thread to completion
    ///
    /// Blocks until all threads are terminated, then releases all stacks
    /// and control blocks. A preemptive run installs the signal handler and
    /// unblocks the signal on this OS thread; both are put back as they
    /// were before returning.
    ///
    /// # Returns
    ///
    /// * `Ok(summary)` - Every thread terminated
    /// * `Err(AlreadyRunning)` - Called from inside a running scheduler
    /// * `Err(Timer | Signal)` - Preemption could not be set up; no thread
    ///   has run
    pub fn run(self) -> Result<RunSummary> {
        if !active().is_null() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let Self { mut table, config } = self;

        // Released after the loop: timer, then signal mask, then handler
        let (timer, unblocked, handler) = if config.preemption && !table.is_empty() {
            let handler = interrupt::install()?;
            let timer = PreemptionTimer::create(config.time_slice)?;
            (Some(timer), Some(UnblockGuard::unblock()), Some(handler))
        } else {
            (None, None, None)
        };

        info!(
            "running {} threads ({})",
            table.len(),
            if timer.is_some() { "preemptive" } else { "cooperative" }
        );

        let mut exec = Executor::new(timer);
        let exec_ptr: *mut Executor = &mut exec;
        {
            let _active = ActiveGuard::enter(exec_ptr);
            table.reset_anchor();

            while let Some(index) = table.candidate() {
                table.set_current(index);
                let block = table.block_ptr(index);
                // SAFETY: the executor outlives the loop, the block stays
                // in place until teardown and the master context holds
                // control here
                unsafe { dispatch(exec_ptr, block) };
            }

            if let Some(timer) = exec.timer.as_ref() {
                timer.disarm();
            }
        }

        if exec.arm_failures > 0 {
            warn!("preemption timer failed to arm {} times", exec.arm_failures);
        }
        drop(exec);
        drop(unblocked);
        drop(handler);

        let summary = RunSummary { threads: table.teardown() };
        let total = summary.total_stats();
        info!(
            "run finished: {} threads, {} dispatches, {} preemptions",
            summary.len(),
            total.schedule_count,
            total.involuntary_switches
        );
        Ok(summary)
    }
}

/// ============================================================================
/// Dispatch and Yield Paths
/// ============================================================================

/// Switch from the master context onto `block`
///
/// Returns once the thread yields, is preempted or terminates.
///
/// # Safety
///
/// Must be called from the master context with a runnable `block` that
/// stays valid for the whole run.
unsafe fn dispatch(exec: *mut Executor, block: *mut ControlBlock<'_>) {
    // Entry lifetimes are erased; run() outlives every thread
    let block = block.cast::<ControlBlock<'static>>();

    match (*block).status {
        ThreadState::Init => {
            (*block).context = Context::bootstrap(
                (*block).stack.top(),
                thread_start,
                exec as usize,
                block as usize,
            );
        }
        ThreadState::Sleeping => {}
        state => unreachable!("dispatching thread in state {state:?}"),
    }

    (*block).set_state(ThreadState::Running);
    (*block).stats.schedule_count += 1;
    (*exec).running = block;

    // Fresh slice for every dispatch
    if let Some(timer) = (*exec).timer.as_ref() {
        if timer.arm().is_err() {
            (*exec).arm_failures += 1;
        }
    }

    arch::switch(&mut (*exec).master, &(*block).context);

    // Whoever switched back left preemption masked
    debug_assert!((*exec).preempt.is_masked());
    (*exec).running = ptr::null_mut();
}

/// First function on every thread stack
///
/// Runs the entry with panics contained, marks the thread terminated and
/// switches to the master context for good.
extern "C" fn thread_start(exec: usize, block: usize) -> ! {
    let exec = exec as *mut Executor;
    let block = block as *mut ControlBlock<'static>;

    // SAFETY: both pointers were handed over by dispatch() and stay valid
    // until teardown, which only happens after this thread terminates
    unsafe {
        (*exec).preempt.unmask();

        let entry = &mut (*block).entry;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            if let Some(entry) = entry.as_mut() {
                entry.invoke();
            }
        }));

        // The rest must not be interrupted: it may free memory
        (*exec).preempt.mask();
        let outcome = match result {
            Ok(()) => ThreadOutcome::Completed,
            Err(payload) => ThreadOutcome::from_panic(payload.as_ref()),
        };
        (*block).outcome = Some(outcome);
        (*block).set_state(ThreadState::Terminated);

        arch::switch(&mut (*block).context, &(*exec).master);
    }

    // Terminated threads are never dispatched again
    std::process::abort()
}

/// Give up the rest of the current time slice
///
/// Suspends the calling logical thread and lets the scheduler dispatch the
/// next candidate; returns when this thread is dispatched again. Does
/// nothing when called outside a running logical thread.
pub fn yield_now() {
    let exec = active();
    if exec.is_null() {
        return;
    }

    // SAFETY: a non-null executor is alive for the whole run, and only
    // this context touches it until the switch below
    unsafe {
        let owned = (*exec).preempt.mask();
        let block = (*exec).running;
        if block.is_null() {
            if owned {
                (*exec).preempt.unmask();
            }
            return;
        }

        (*block).set_state(ThreadState::Sleeping);
        (*block).stats.voluntary_switches += 1;
        arch::switch(&mut (*block).context, &(*exec).master);

        // Redispatched; a yield inside no_preempt() keeps the mask
        if owned {
            (*exec).preempt.unmask();
        }
    }
}

/// Timer tick, called from the preemption signal handler
///
/// Forces the running thread to yield unless preemption is masked, and
/// re-arms the timer on every path, after the forced yield completes.
pub(crate) fn preempt_tick() {
    let exec = active();
    if exec.is_null() {
        return;
    }

    // SAFETY: as in yield_now(); the handler runs on the interrupted
    // context, which is the only one touching the executor
    unsafe {
        if !(*exec).preempt.mask() {
            // Scheduler loop or yield path in progress
            (*exec).preempt.defer();
            rearm(exec);
            return;
        }

        let block = (*exec).running;
        if block.is_null() {
            (*exec).preempt.unmask();
            rearm(exec);
            return;
        }

        // Other threads must stay preemptible while this handler frame
        // is suspended
        interrupt::unblock_preempt_signal();

        (*block).set_state(ThreadState::Sleeping);
        (*block).stats.involuntary_switches += 1;
        arch::switch(&mut (*block).context, &(*exec).master);

        rearm(exec);
        (*exec).preempt.unmask();
    }
}

/// Async-signal-safe timer re-arm
///
/// # Safety
///
/// `exec` must be the live executor.
unsafe fn rearm(exec: *mut Executor) {
    if let Some(timer) = (*exec).timer.as_ref() {
        timer.rearm();
    }
}

/// Run `f` with timer preemption masked
///
/// For entry code that calls non-reentrant facilities (the allocator,
/// stdio) while preemption is enabled. A firing that arrives inside `f` is
/// honoured with a yield right after it. Outside a running scheduler this
/// just calls `f`.
///
/// A thread preempted while holding such a lock keeps it until it is
/// dispatched again, and every other context on this OS thread, the
/// scheduler loop included, deadlocks on it. The scheduler loop itself
/// does not log or allocate between dispatches; logging happens before
/// the first and after the last.
pub fn no_preempt<R>(f: impl FnOnce() -> R) -> R {
    struct Unmask {
        exec: *mut Executor,
        owned: bool,
    }

    impl Drop for Unmask {
        fn drop(&mut self) {
            if !self.owned {
                return;
            }
            // SAFETY: the executor outlives every logical thread
            let deferred = unsafe { (*self.exec).preempt.unmask() };
            if deferred && !std::thread::panicking() {
                yield_now();
            }
        }
    }

    let exec = active();
    if exec.is_null() {
        return f();
    }

    // SAFETY: non-null executor is alive for the whole run
    let owned = unsafe { (*exec).preempt.mask() };
    let _unmask = Unmask { exec, owned };
    f()
}

/// Get the ID of the running logical thread
pub fn current() -> Option<ThreadId> {
    let exec = active();
    if exec.is_null() {
        return None;
    }
    // SAFETY: non-null executor is alive for the whole run
    unsafe {
        let block = (*exec).running;
        (!block.is_null()).then(|| (*block).id)
    }
}

/// Get the usable stack range of the running logical thread
pub fn current_stack() -> Option<Range<usize>> {
    let exec = active();
    if exec.is_null() {
        return None;
    }
    // SAFETY: non-null executor is alive for the whole run
    unsafe {
        let block = (*exec).running;
        (!block.is_null()).then(|| (*block).stack_range())
    }
}

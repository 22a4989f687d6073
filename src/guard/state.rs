//! Lock state shared by the mutex and singleton guards.
//!
//! The guard state `{ locked, pending_trailing }` is packed into one atomic
//! word so every transition is a single compare-and-swap:
//!
//! | phase      | locked | pending_trailing |
//! |------------|--------|------------------|
//! | `Idle`     | false  | false            |
//! | `Running`  | true   | false            |
//! | `Queued`   | true   | true             |
//! | `Handoff`  | true   | null             |
//!
//! `Handoff` only exists between the end of a run and the start of its
//! trailing re-run. Callers arriving in that window are dropped.

use std::sync::atomic::{AtomicU8, Ordering};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const QUEUED: u8 = 2;
const HANDOFF: u8 = 3;

/// Observable phase of a guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPhase {
    /// Nothing in flight
    Idle,
    /// A call is executing
    Running,
    /// A call is executing and one trailing re-run is queued
    TrailingQueued,
    /// A run finished and its trailing re-run is about to start
    Handoff,
}

/// Lock state machine.
#[derive(Debug)]
pub(crate) struct GuardState {
    phase: AtomicU8,
    trailing: bool,
}

impl GuardState {
    pub(crate) fn new(trailing: bool) -> Self {
        Self {
            phase: AtomicU8::new(IDLE),
            trailing,
        }
    }

    /// Take the lock if it is free. First caller past the CAS wins.
    pub(crate) fn try_acquire(&self) -> Option<RunLock<'_>> {
        self.phase
            .compare_exchange(IDLE, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunLock {
                state: self,
                held: true,
            })
    }

    /// Called by a caller that lost the race for the lock.
    ///
    /// Returns `true` when the call was remembered as the trailing re-run.
    /// At most one re-run is remembered at a time.
    pub(crate) fn absorb(&self) -> bool {
        self.trailing
            && self
                .phase
                .compare_exchange(RUNNING, QUEUED, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
    }

    pub(crate) fn phase(&self) -> GuardPhase {
        match self.phase.load(Ordering::SeqCst) {
            IDLE => GuardPhase::Idle,
            RUNNING => GuardPhase::Running,
            QUEUED => GuardPhase::TrailingQueued,
            _ => GuardPhase::Handoff,
        }
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.phase() != GuardPhase::Idle
    }

    pub(crate) fn has_pending_trailing(&self) -> bool {
        self.phase() == GuardPhase::TrailingQueued
    }
}

/// Proof of holding the guard lock.
///
/// Dropping it releases the lock, so a run that panics or whose future is
/// dropped mid-flight still unlocks the guard. A queued re-run is discarded
/// in that case.
pub(crate) struct RunLock<'a> {
    state: &'a GuardState,
    held: bool,
}

impl RunLock<'_> {
    /// Start (or restart) a run, clearing any trailing marker.
    pub(crate) fn begin_run(&self) {
        self.state.phase.store(RUNNING, Ordering::SeqCst);
    }

    /// Finish a run.
    ///
    /// Returns `true` if a trailing re-run was queued; the lock is then kept
    /// and handed to the re-run. Otherwise the lock is released.
    pub(crate) fn finish(&mut self) -> bool {
        match self.state.phase.compare_exchange(
            RUNNING,
            IDLE,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                self.held = false;
                false
            }
            Err(_) => {
                // Only the holder moves out of QUEUED, so this store cannot race.
                self.state.phase.store(HANDOFF, Ordering::SeqCst);
                true
            }
        }
    }
}

impl Drop for RunLock<'_> {
    fn drop(&mut self) {
        if self.held {
            self.state.phase.store(IDLE, Ordering::SeqCst);
        }
    }
}

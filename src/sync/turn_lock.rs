//! Turn-taking lock
//!
//! Reentrant for the thread that holds it. On release, the releasing thread
//! steps aside: it cannot take the lock back while another thread is waiting
//! for it, so callers interleave instead of one thread starving the rest.

use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct State {
    /// Current holder
    owner: Option<ThreadId>,

    /// Reentrant acquisitions by the holder
    depth: usize,

    /// Thread that released last
    last_releaser: Option<ThreadId>,

    /// Threads blocked in acquire
    waiting: usize,
}

/// Reentrant lock with strict hand-off to waiters
#[derive(Debug, Default)]
pub struct TurnLock {
    state: Mutex<State>,
    turn: Condvar,
}

/// Held turn; released on drop
#[must_use = "the turn is released as soon as the guard is dropped"]
pub struct TurnGuard<'a> {
    lock: &'a TurnLock,
}

impl TurnLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a turn, blocking until it is granted.
    ///
    /// The holder may acquire again without blocking; every guard must be
    /// dropped before the turn passes on.
    pub fn acquire(&self) -> TurnGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.owner == Some(me) {
            state.depth += 1;
            return TurnGuard { lock: self };
        }

        state.waiting += 1;
        // Free, and not our own release racing ahead of someone else's turn.
        while state.owner.is_some() || (state.last_releaser == Some(me) && state.waiting > 1) {
            self.turn.wait(&mut state);
        }
        state.waiting -= 1;

        state.owner = Some(me);
        state.depth = 1;
        TurnGuard { lock: self }
    }

    /// True if some thread holds the lock
    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// True if the calling thread holds the lock
    pub fn is_held_by_current_thread(&self) -> bool {
        self.state.lock().owner == Some(thread::current().id())
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.depth -= 1;
        if state.depth > 0 {
            return;
        }

        state.last_releaser = state.owner.take();
        drop(state);
        self.turn.notify_all();
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

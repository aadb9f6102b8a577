//! Operation state guard.
//!
//! Applying a remote merge or a clear fires the same store change events a
//! human edit would. Without a gate, the engine would perceive its own
//! writes as new local edits and recursively re-trigger an upload. The guard
//! is that gate: a single-holder execution token serializing every
//! tree-mutating operation, consulted by the event intake loop before any
//! reaction.
//!
//! Acquisition is scoped: the returned [`OperationToken`] restores the state
//! to [`OperationState::Idle`] on drop, so every exit path, including error
//! returns and panics, releases the guard. A stuck non-idle guard would
//! permanently disable sync.
//!
//! Operations that find the guard held are dropped, not queued; the system
//! favors "skip this cycle" over buffering.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// What the engine is currently doing to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// No mutating operation in flight.
    Idle,
    /// A sync (upload, download or import) holds the guard.
    Syncing,
    /// A standalone clear holds the guard.
    Clearing,
}

#[derive(Debug)]
struct GuardInner {
    state: Mutex<OperationState>,
    clearing: AtomicBool,
}

/// Single-holder token gate over all tree-mutating operations.
///
/// Cheap to clone; clones share the same state.
#[derive(Debug, Clone)]
pub struct OperationGuard {
    inner: Arc<GuardInner>,
}

impl OperationGuard {
    /// Create an idle guard.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(GuardInner {
                state: Mutex::new(OperationState::Idle),
                clearing: AtomicBool::new(false),
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> OperationState {
        *self.inner.state.lock()
    }

    /// Whether no operation holds the guard.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state() == OperationState::Idle
    }

    /// Whether a clear phase is in progress.
    #[must_use]
    pub fn is_clearing(&self) -> bool {
        self.inner.clearing.load(Ordering::SeqCst)
    }

    /// Whether a store change event should trigger sync work.
    ///
    /// False while any operation holds the guard or a clear phase runs;
    /// bookkeeping may still happen, sync-triggering must not.
    #[must_use]
    pub fn should_react_to_events(&self) -> bool {
        self.is_idle() && !self.is_clearing()
    }

    /// Try to acquire the guard for a mutating operation.
    ///
    /// Returns `None` when another operation already holds it. The token
    /// resets the guard to idle when dropped.
    #[must_use]
    pub fn try_acquire(&self, state: OperationState) -> Option<OperationToken> {
        debug_assert_ne!(state, OperationState::Idle);
        let mut current = self.inner.state.lock();
        if *current != OperationState::Idle {
            return None;
        }
        *current = state;
        Some(OperationToken {
            inner: Arc::clone(&self.inner),
        })
    }
}

impl Default for OperationGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped hold on the guard. Dropping it releases the guard.
#[derive(Debug)]
pub struct OperationToken {
    inner: Arc<GuardInner>,
}

impl OperationToken {
    /// Enter a clear phase within the held operation.
    ///
    /// The flag is visible through [`OperationGuard::is_clearing`] and reset
    /// when the returned value drops.
    #[must_use]
    pub fn begin_clearing(&self) -> ClearingPhase<'_> {
        self.inner.clearing.store(true, Ordering::SeqCst);
        ClearingPhase { token: self }
    }
}

impl Drop for OperationToken {
    fn drop(&mut self) {
        self.inner.clearing.store(false, Ordering::SeqCst);
        *self.inner.state.lock() = OperationState::Idle;
    }
}

/// Scoped clear phase; resets the clearing flag on drop.
#[derive(Debug)]
pub struct ClearingPhase<'a> {
    token: &'a OperationToken,
}

impl Drop for ClearingPhase<'_> {
    fn drop(&mut self) {
        self.token.inner.clearing.store(false, Ordering::SeqCst);
    }
}

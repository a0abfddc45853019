//! Registry of live sessions
//!
//! The registry is the only state shared between session tasks. Entries are
//! inserted when a channel opens and removed exactly once, whichever side
//! triggers the teardown. Removing an entry cancels the session.

use crate::metrics::BridgeMetrics;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

pub type SessionId = Uuid;

/// Session phase. Phases only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Phase {
    AwaitingGreeting = 0,
    AwaitingRequest = 1,
    Relaying = 2,
    Closed = 3,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::AwaitingGreeting,
            1 => Self::AwaitingRequest,
            2 => Self::Relaying,
            _ => Self::Closed,
        }
    }
}

/// Phase shared between a session task and the registry
#[derive(Debug)]
pub struct PhaseCell(AtomicU8);

impl PhaseCell {
    fn new() -> Self {
        Self(AtomicU8::new(Phase::AwaitingGreeting as u8))
    }

    pub fn get(&self) -> Phase {
        Phase::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `next` unless the phase is already further along.
    /// Returns the previous phase.
    pub fn advance(&self, next: Phase) -> Phase {
        Phase::from_u8(self.0.fetch_max(next as u8, Ordering::AcqRel))
    }
}

/// What a session task holds onto for its own entry
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub phase: Arc<PhaseCell>,
    pub cancel: CancellationToken,
}

struct SessionEntry {
    peer: String,
    transport: &'static str,
    opened_at: Instant,
    phase: Arc<PhaseCell>,
    cancel: CancellationToken,
}

/// Concurrent map of session id to session state
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
    opened_total: AtomicU64,
    removed_total: AtomicU64,
    metrics: BridgeMetrics,
}

impl SessionRegistry {
    pub fn new(metrics: BridgeMetrics) -> Self {
        Self {
            sessions: DashMap::new(),
            opened_total: AtomicU64::new(0),
            removed_total: AtomicU64::new(0),
            metrics,
        }
    }

    /// Insert a new session in `AwaitingGreeting`
    pub fn register(&self, peer: impl Into<String>, transport: &'static str) -> SessionHandle {
        let id = Uuid::new_v4();
        let phase = Arc::new(PhaseCell::new());
        let cancel = CancellationToken::new();

        self.sessions.insert(
            id,
            SessionEntry {
                peer: peer.into(),
                transport,
                opened_at: Instant::now(),
                phase: phase.clone(),
                cancel: cancel.clone(),
            },
        );
        self.opened_total.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_session_opened(transport);

        SessionHandle { id, phase, cancel }
    }

    /// Remove a session, marking it closed and cancelling its task.
    ///
    /// Returns `true` only for the call that actually removed the entry.
    pub fn remove(&self, id: &SessionId) -> bool {
        let Some((_, entry)) = self.sessions.remove(id) else {
            return false;
        };

        entry.phase.advance(Phase::Closed);
        entry.cancel.cancel();
        self.removed_total.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_session_closed(entry.transport);

        debug!(
            "Session {} from {} ({}) removed after {:?}",
            id,
            entry.peer,
            entry.transport,
            entry.opened_at.elapsed()
        );
        true
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn phase(&self, id: &SessionId) -> Option<Phase> {
        self.sessions.get(id).map(|entry| entry.phase.get())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn opened_total(&self) -> u64 {
        self.opened_total.load(Ordering::Relaxed)
    }

    pub fn removed_total(&self) -> u64 {
        self.removed_total.load(Ordering::Relaxed)
    }

    /// Remove every session. Returns how many were live.
    pub fn shutdown(&self) -> usize {
        let ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.iter().filter(|id| self.remove(id)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(BridgeMetrics::new().unwrap())
    }

    #[test]
    fn test_phase_never_regresses() {
        let cell = PhaseCell::new();
        assert_eq!(cell.get(), Phase::AwaitingGreeting);

        cell.advance(Phase::Relaying);
        assert_eq!(cell.advance(Phase::AwaitingRequest), Phase::Relaying);
        assert_eq!(cell.get(), Phase::Relaying);

        cell.advance(Phase::Closed);
        assert_eq!(cell.get(), Phase::Closed);
    }

    #[test]
    fn test_register_and_remove_once() {
        let registry = registry();
        let handle = registry.register("127.0.0.1:5000", "memory");

        assert!(registry.contains(&handle.id));
        assert_eq!(registry.phase(&handle.id), Some(Phase::AwaitingGreeting));

        assert!(registry.remove(&handle.id));
        assert!(!registry.remove(&handle.id));
        assert!(handle.cancel.is_cancelled());
        assert_eq!(handle.phase.get(), Phase::Closed);
        assert_eq!(registry.removed_total(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_removal_counts_once() {
        let registry = Arc::new(registry());
        let handle = registry.register("peer", "memory");

        let removed: usize = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    let registry = registry.clone();
                    let id = handle.id;
                    scope.spawn(move || registry.remove(&id))
                })
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().unwrap() as usize)
                .sum()
        });

        assert_eq!(removed, 1);
        assert_eq!(registry.removed_total(), 1);
    }

    #[test]
    fn test_shutdown_cancels_everything() {
        let registry = registry();
        let handles: Vec<_> = (0..3).map(|i| registry.register(format!("peer-{}", i), "tcp")).collect();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.shutdown(), 3);
        assert!(registry.is_empty());
        assert!(handles.iter().all(|handle| handle.cancel.is_cancelled()));
        assert_eq!(registry.opened_total(), 3);
    }
}

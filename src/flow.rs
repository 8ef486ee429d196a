//! In-flight bookkeeping shared by the workflow controllers.
//!
//! Every request is issued under a [`Ticket`] carrying the generation it was issued in.
//! Resetting a controller advances the generation, so a response that arrives afterwards
//! no longer matches and is dropped instead of mutating the fresh state.

use crate::types::{FlowError, RequestKind};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub(crate) struct InFlight {
    generation: u64,
    pending: BTreeSet<RequestKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket {
    kind: RequestKind,
    generation: u64,
}

impl InFlight {
    /// Reserve `kind`; at most one request of each kind is in flight.
    pub(crate) fn begin(&mut self, kind: RequestKind) -> Result<Ticket, FlowError> {
        if !self.pending.insert(kind) {
            return Err(FlowError::Busy(kind));
        }

        Ok(Ticket {
            kind,
            generation: self.generation,
        })
    }

    /// Release the ticket. Returns `false` when the ticket belongs to an older generation.
    pub(crate) fn finish(&mut self, ticket: Ticket) -> bool {
        if ticket.generation != self.generation {
            return false;
        }
        self.pending.remove(&ticket.kind);
        true
    }

    pub(crate) fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.pending.clear();
    }

    pub(crate) fn is_pending(&self, kind: RequestKind) -> bool {
        self.pending.contains(&kind)
    }

    /// Pending kinds in declaration order
    pub(crate) fn pending(&self) -> Vec<RequestKind> {
        self.pending.iter().copied().collect()
    }
}

/// Lock a controller state, recovering it if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

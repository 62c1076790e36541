//! Stale-result suppression for asynchronous validation.
//!
//! Every validation run takes a ticket from the field's monotonic sequence.
//! A completion may only write `error`/`validating` back if its ticket still
//! matches the field's current sequence, so a slow validator for an old value
//! can never clobber the result for a newer one.

use crate::registry::FieldState;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ValidationTicket(pub u64);

impl FieldState {
    pub(crate) fn begin_validation(&mut self) -> ValidationTicket {
        self.sequence += 1;
        ValidationTicket(self.sequence)
    }

    pub(crate) fn is_current(&self, ticket: ValidationTicket) -> bool {
        self.sequence == ticket.0
    }

    /// Bumps the sequence without starting a run, so any in-flight result is
    /// discarded on completion. Used by `reset`.
    pub(crate) fn invalidate_in_flight(&mut self) {
        self.sequence += 1;
    }
}

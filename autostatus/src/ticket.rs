//! Ticket Repository seam
//!
//! The host owns tickets; the engine only reads the current status and
//! entity, and asks the host to write a new status.

use serde::{Deserialize, Serialize};

use crate::error::AutoStatusResult;
use crate::status::{StatusId, StatusVocabulary};

/// Ticket identifier as stored by the host
pub type TicketId = i64;

/// User identifier as stored by the host
pub type UserId = i64;

/// Entity (organisational unit) identifier; `0` is the root entity
pub type EntityId = i64;

/// Read-only view of a ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSnapshot {
    pub ticket_id: TicketId,
    pub current_status: StatusId,
    pub entity_id: EntityId,
}

/// Access to host tickets.
///
/// Implementations report unreachable storage as
/// [`crate::AutoStatusError::Storage`]; a missing ticket is `Ok(None)`.
pub trait TicketRepository: Send + Sync {
    /// Fetch a ticket by id.
    fn find(&self, ticket_id: TicketId) -> AutoStatusResult<Option<TicketSnapshot>>;

    /// Persist a new status for the ticket.
    fn update_status(&self, ticket_id: TicketId, status: StatusId) -> AutoStatusResult<()>;

    /// Status vocabulary known to the host.
    ///
    /// Hosts without a configurable vocabulary can rely on the default,
    /// which is the stock six-status set.
    fn statuses(&self) -> AutoStatusResult<StatusVocabulary> {
        Ok(StatusVocabulary::fallback())
    }
}

//! Technician Classifier
//!
//! Decides whether a followup author counts as a technician. The answer only
//! selects which configured status a followup applies; it never grants or
//! denies access.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AutoStatusResult;
use crate::ticket::{EntityId, TicketId, TicketRepository, UserId};
use crate::timer::SubjectRecord;

/// Which role assignments count for a capability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "entity_id", rename_all = "snake_case")]
pub enum RoleScope {
    /// Any assignment the user holds
    Anywhere,
    /// Assignments on this entity, on the root entity, or flagged recursive
    Entity(EntityId),
}

impl RoleScope {
    /// Whether an assignment on `entity_id` applies under this scope.
    pub fn covers(&self, entity_id: EntityId, recursive: bool) -> bool {
        match self {
            Self::Anywhere => true,
            Self::Entity(target) => entity_id == *target || entity_id == 0 || recursive,
        }
    }
}

/// Host identity and role lookups.
pub trait RoleResolver: Send + Sync {
    /// Whether the user holds the ticket-ownership capability through any
    /// role assignment within `scope`.
    fn holds_ticket_ownership(&self, user_id: UserId, scope: RoleScope) -> AutoStatusResult<bool>;

    /// Whether the user may update the given timer subject.
    fn can_update_subject(&self, user_id: UserId, subject: &SubjectRecord)
        -> AutoStatusResult<bool>;
}

/// Classifies users as technicians, scoped by the ticket's entity.
pub struct TechnicianClassifier {
    roles: Arc<dyn RoleResolver>,
    tickets: Arc<dyn TicketRepository>,
}

impl TechnicianClassifier {
    pub fn new(roles: Arc<dyn RoleResolver>, tickets: Arc<dyn TicketRepository>) -> Self {
        Self { roles, tickets }
    }

    /// Fails closed for non-positive user ids.
    ///
    /// With `ticket_id > 0` and an existing ticket, only assignments on the
    /// ticket's entity, the root entity, or recursive ones count. An unknown
    /// ticket widens the check to every assignment.
    pub fn is_technician(&self, user_id: UserId, ticket_id: TicketId) -> AutoStatusResult<bool> {
        if user_id <= 0 {
            return Ok(false);
        }

        let scope = if ticket_id > 0 {
            match self.tickets.find(ticket_id)? {
                Some(ticket) => RoleScope::Entity(ticket.entity_id),
                None => RoleScope::Anywhere,
            }
        } else {
            RoleScope::Anywhere
        };

        let technician = self.roles.holds_ticket_ownership(user_id, scope)?;
        debug!(user_id, ticket_id, ?scope, technician, "Classified followup author");
        Ok(technician)
    }
}

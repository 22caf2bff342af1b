//! Domain events that can drive a status change
//!
//! Each variant carries exactly what its adapter needs. The host builds
//! these from its own entities; timer events are produced by the
//! [`crate::timer::TimerStateMachine`] and the [`crate::bridge::ExternalTimerBridge`].

use serde::{Deserialize, Serialize};

use crate::ticket::{TicketId, UserId};

/// Kind of ITIL object a followup is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItilKind {
    Ticket,
    Problem,
    Change,
}

impl ItilKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ticket => "Ticket",
            Self::Problem => "Problem",
            Self::Change => "Change",
        }
    }
}

impl std::fmt::Display for ItilKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketCreated {
    pub ticket_id: TicketId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAdded {
    pub task_id: i64,
    pub ticket_id: TicketId,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowupAdded {
    pub followup_id: i64,
    pub item_kind: ItilKind,
    pub item_id: i64,
    pub author_id: UserId,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerStarted {
    pub ticket_id: TicketId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerStopped {
    pub ticket_id: TicketId,
    /// Set by an emitter that already saw another timer running on the
    /// ticket. When false the engine still asks its running-timer lookups.
    #[serde(default)]
    pub other_timer_running: bool,
}

/// Every event the adapters understand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    TicketCreated(TicketCreated),
    TaskAdded(TaskAdded),
    FollowupAdded(FollowupAdded),
    TimerStarted(TimerStarted),
    TimerStopped(TimerStopped),
}

impl DomainEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TicketCreated(_) => "ticket_created",
            Self::TaskAdded(_) => "task_added",
            Self::FollowupAdded(_) => "followup_added",
            Self::TimerStarted(_) => "timer_started",
            Self::TimerStopped(_) => "timer_stopped",
        }
    }
}

//! Rule Evaluator: deterministic status transition decisions
//!
//! Given an event kind, a ticket and a computed target status, walks the
//! guard sequence and asks the [`TicketRepository`] for at most one write.
//!
//! # Guard sequence
//!
//! ```text
//! ticket_id <= 0                  → skip
//! target <= 0 (do not change)     → skip
//! ticket missing                  → skip
//! terminal + ignore_solved_closed → skip
//! current status not allowed      → skip   (per-event CSV allow-list)
//! target not in vocabulary        → skip
//! target == current               → skip
//! otherwise                       → update_status(ticket, target)
//! ```
//!
//! Skips are silent for the host: they are returned as
//! [`Outcome::Skipped`] and logged at debug level, never raised as errors.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AutoStatusConfig;
use crate::error::AutoStatusResult;
use crate::status::{self, StatusFilter, StatusId};
use crate::ticket::{TicketId, TicketRepository};

/// Which rule triggered an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    OnCreate,
    OnTask,
    OnFollowup,
    OnTimerStart,
    OnTimerStop,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnCreate => "on_create",
            Self::OnTask => "on_task",
            Self::OnFollowup => "on_followup",
            Self::OnTimerStart => "on_timer_start",
            Self::OnTimerStop => "on_timer_stop",
        }
    }

    pub fn all() -> &'static [EventKind] {
        &[
            Self::OnCreate,
            Self::OnTask,
            Self::OnFollowup,
            Self::OnTimerStart,
            Self::OnTimerStop,
        ]
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to move a ticket to `target_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketStatusEvent {
    pub event_kind: EventKind,
    pub ticket_id: TicketId,
    /// `0` means "do not change"
    pub target_status: StatusId,
}

impl TicketStatusEvent {
    pub fn new(event_kind: EventKind, ticket_id: TicketId, target_status: StatusId) -> Self {
        Self {
            event_kind,
            ticket_id,
            target_status,
        }
    }
}

/// Why an event produced no status change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The rule for this event kind is switched off
    RuleDisabled { event_kind: EventKind },
    /// Private task or followup while private items are ignored
    PrivateItem,
    /// Followup or timer attached to something other than a ticket
    NotATicket,
    /// Timer events while the timer integration is off or its source is unavailable
    TimerIntegrationOff,
    /// Another timer is still running on the ticket
    OtherTimerRunning { ticket_id: TicketId },
    /// External timer notification that is neither a start nor a stop
    IrrelevantTimerChange,
    InvalidTicketId { ticket_id: TicketId },
    /// External tracker row with no usable task id
    InvalidTaskId { task_id: i64 },
    DoNotChange,
    TicketNotFound { ticket_id: TicketId },
    TerminalStatus { current: StatusId },
    CurrentStatusNotAllowed { current: StatusId },
    UnknownTargetStatus { target: StatusId },
    AlreadyInStatus { status: StatusId },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RuleDisabled { event_kind } => write!(f, "{} rule disabled", event_kind),
            Self::PrivateItem => write!(f, "private item ignored"),
            Self::NotATicket => write!(f, "subject is not a ticket"),
            Self::TimerIntegrationOff => write!(f, "timer integration unavailable"),
            Self::OtherTimerRunning { ticket_id } => {
                write!(f, "another timer still running on ticket {}", ticket_id)
            }
            Self::IrrelevantTimerChange => write!(f, "timer change is neither start nor stop"),
            Self::InvalidTicketId { ticket_id } => write!(f, "invalid ticket id {}", ticket_id),
            Self::InvalidTaskId { task_id } => write!(f, "invalid task id {}", task_id),
            Self::DoNotChange => write!(f, "target is do-not-change"),
            Self::TicketNotFound { ticket_id } => write!(f, "ticket {} not found", ticket_id),
            Self::TerminalStatus { current } => write!(f, "ticket is terminal ({})", current),
            Self::CurrentStatusNotAllowed { current } => {
                write!(f, "current status {} not in allow-list", current)
            }
            Self::UnknownTargetStatus { target } => write!(f, "unknown target status {}", target),
            Self::AlreadyInStatus { status } => write!(f, "already in status {}", status),
        }
    }
}

/// Result of handling one event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Applied {
        ticket_id: TicketId,
        from: StatusId,
        to: StatusId,
        event_kind: EventKind,
    },
    Skipped {
        #[serde(flatten)]
        reason: SkipReason,
    },
}

impl Outcome {
    pub fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { reason }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            Self::Skipped { reason } => Some(reason),
            Self::Applied { .. } => None,
        }
    }
}

/// Applies the guard sequence and performs the status write.
pub struct RuleEvaluator {
    tickets: Arc<dyn TicketRepository>,
}

impl RuleEvaluator {
    pub fn new(tickets: Arc<dyn TicketRepository>) -> Self {
        Self { tickets }
    }

    /// Evaluate one event against `config`.
    ///
    /// Repository failures propagate; every guard failure is an
    /// `Ok(Outcome::Skipped)`.
    pub fn apply(
        &self,
        config: &AutoStatusConfig,
        event: &TicketStatusEvent,
    ) -> AutoStatusResult<Outcome> {
        let outcome = self.evaluate(config, event)?;
        match &outcome {
            Outcome::Applied {
                ticket_id,
                from,
                to,
                event_kind,
            } => info!(
                ticket_id,
                from,
                to,
                event = %event_kind,
                "Ticket status changed"
            ),
            Outcome::Skipped { reason } => debug!(
                ticket_id = event.ticket_id,
                target = event.target_status,
                event = %event.event_kind,
                %reason,
                "Status change skipped"
            ),
        }
        Ok(outcome)
    }

    fn evaluate(
        &self,
        config: &AutoStatusConfig,
        event: &TicketStatusEvent,
    ) -> AutoStatusResult<Outcome> {
        let TicketStatusEvent {
            event_kind,
            ticket_id,
            target_status: target,
        } = *event;

        if ticket_id <= 0 {
            return Ok(Outcome::skipped(SkipReason::InvalidTicketId { ticket_id }));
        }
        if target <= 0 {
            return Ok(Outcome::skipped(SkipReason::DoNotChange));
        }

        let Some(ticket) = self.tickets.find(ticket_id)? else {
            return Ok(Outcome::skipped(SkipReason::TicketNotFound { ticket_id }));
        };
        let current = ticket.current_status;

        if config.ignore_solved_closed && status::is_terminal(current) {
            return Ok(Outcome::skipped(SkipReason::TerminalStatus { current }));
        }

        if !StatusFilter::parse(config.allowed_statuses(event_kind)).allows(current) {
            return Ok(Outcome::skipped(SkipReason::CurrentStatusNotAllowed {
                current,
            }));
        }

        if !self.tickets.statuses()?.contains(target) {
            return Ok(Outcome::skipped(SkipReason::UnknownTargetStatus { target }));
        }

        if current == target {
            return Ok(Outcome::skipped(SkipReason::AlreadyInStatus { status: current }));
        }

        self.tickets.update_status(ticket_id, target)?;
        Ok(Outcome::Applied {
            ticket_id,
            from: current,
            to: target,
            event_kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTicketRepository;
    use crate::status::{ASSIGNED, CLOSED, NEW, SOLVED, WAITING};

    fn setup(current: StatusId) -> (Arc<MemoryTicketRepository>, RuleEvaluator) {
        let tickets = Arc::new(MemoryTicketRepository::new());
        tickets.insert(1, current, 0);
        let evaluator = RuleEvaluator::new(tickets.clone());
        (tickets, evaluator)
    }

    fn task_event(target: StatusId) -> TicketStatusEvent {
        TicketStatusEvent::new(EventKind::OnTask, 1, target)
    }

    #[test]
    fn test_applies_transition() {
        let (tickets, evaluator) = setup(NEW);
        let outcome = evaluator
            .apply(&AutoStatusConfig::default(), &task_event(ASSIGNED))
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Applied {
                ticket_id: 1,
                from: NEW,
                to: ASSIGNED,
                event_kind: EventKind::OnTask
            }
        );
        assert_eq!(tickets.updates(), vec![(1, ASSIGNED)]);
        assert_eq!(tickets.status_of(1), Some(ASSIGNED));
    }

    #[test]
    fn test_invalid_ticket_and_sentinel_short_circuit() {
        let (tickets, evaluator) = setup(NEW);
        let config = AutoStatusConfig::default();

        let outcome = evaluator
            .apply(&config, &TicketStatusEvent::new(EventKind::OnTask, 0, ASSIGNED))
            .unwrap();
        assert_eq!(
            outcome.skip_reason(),
            Some(&SkipReason::InvalidTicketId { ticket_id: 0 })
        );

        for target in [0, -1] {
            let outcome = evaluator.apply(&config, &task_event(target)).unwrap();
            assert_eq!(outcome.skip_reason(), Some(&SkipReason::DoNotChange));
        }
        assert_eq!(tickets.find_calls(), 0, "sentinel must not touch the repository");
        assert!(tickets.updates().is_empty());
    }

    #[test]
    fn test_missing_ticket() {
        let (_, evaluator) = setup(NEW);
        let outcome = evaluator
            .apply(
                &AutoStatusConfig::default(),
                &TicketStatusEvent::new(EventKind::OnTask, 99, ASSIGNED),
            )
            .unwrap();
        assert_eq!(
            outcome.skip_reason(),
            Some(&SkipReason::TicketNotFound { ticket_id: 99 })
        );
    }

    #[test]
    fn test_terminal_guard() {
        for current in [SOLVED, CLOSED] {
            let (tickets, evaluator) = setup(current);
            let outcome = evaluator
                .apply(&AutoStatusConfig::default(), &task_event(ASSIGNED))
                .unwrap();
            assert_eq!(
                outcome.skip_reason(),
                Some(&SkipReason::TerminalStatus { current })
            );
            assert!(tickets.updates().is_empty());
        }

        // With the guard off, terminal tickets move like any other.
        let (tickets, evaluator) = setup(CLOSED);
        let config = AutoStatusConfig {
            ignore_solved_closed: false,
            ..Default::default()
        };
        assert!(evaluator.apply(&config, &task_event(ASSIGNED)).unwrap().is_applied());
        assert_eq!(tickets.updates(), vec![(1, ASSIGNED)]);
    }

    #[test]
    fn test_allow_list_uses_matching_event_option() {
        let (tickets, evaluator) = setup(WAITING);
        let config = AutoStatusConfig {
            ontask_allowed_statuses: "1,2".to_string(),
            // other events' lists must not interfere
            onfollowup_allowed_statuses: "4".to_string(),
            ..Default::default()
        };

        let outcome = evaluator.apply(&config, &task_event(ASSIGNED)).unwrap();
        assert_eq!(
            outcome.skip_reason(),
            Some(&SkipReason::CurrentStatusNotAllowed { current: WAITING })
        );

        let followup = TicketStatusEvent::new(EventKind::OnFollowup, 1, ASSIGNED);
        assert!(evaluator.apply(&config, &followup).unwrap().is_applied());
        assert_eq!(tickets.updates().len(), 1);
    }

    #[test]
    fn test_timer_allow_lists() {
        let (_, evaluator) = setup(NEW);
        let config = AutoStatusConfig {
            actualtime_allowed_statuses_start: "2".to_string(),
            actualtime_allowed_statuses_stop: "1".to_string(),
            ..Default::default()
        };
        let start = TicketStatusEvent::new(EventKind::OnTimerStart, 1, ASSIGNED);
        assert!(!evaluator.apply(&config, &start).unwrap().is_applied());
        let stop = TicketStatusEvent::new(EventKind::OnTimerStop, 1, WAITING);
        assert!(evaluator.apply(&config, &stop).unwrap().is_applied());
    }

    #[test]
    fn test_unknown_target_status() {
        let (tickets, evaluator) = setup(NEW);
        let outcome = evaluator
            .apply(&AutoStatusConfig::default(), &task_event(42))
            .unwrap();
        assert_eq!(
            outcome.skip_reason(),
            Some(&SkipReason::UnknownTargetStatus { target: 42 })
        );
        assert!(tickets.updates().is_empty());
    }

    #[test]
    fn test_idempotent_repeat() {
        let (tickets, evaluator) = setup(NEW);
        let config = AutoStatusConfig::default();
        let event = task_event(ASSIGNED);

        assert!(evaluator.apply(&config, &event).unwrap().is_applied());
        let second = evaluator.apply(&config, &event).unwrap();
        assert_eq!(
            second.skip_reason(),
            Some(&SkipReason::AlreadyInStatus { status: ASSIGNED })
        );
        assert_eq!(tickets.updates().len(), 1);
    }

    #[test]
    fn test_repository_failure_propagates() {
        let (tickets, evaluator) = setup(NEW);
        tickets.fail_with("connection refused");
        let err = evaluator
            .apply(&AutoStatusConfig::default(), &task_event(ASSIGNED))
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = Outcome::skipped(SkipReason::TerminalStatus { current: CLOSED });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "skipped");
        assert_eq!(json["reason"], "terminal_status");
        assert_eq!(json["current"], 6);
    }
}

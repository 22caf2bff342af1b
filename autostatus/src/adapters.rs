//! Event Adapters: per-event target status policy
//!
//! Each adapter reads the configuration and its event payload and either
//! produces a [`TicketStatusEvent`] for the evaluator or a [`SkipReason`].
//! No adapter writes anything.

use crate::classifier::TechnicianClassifier;
use crate::config::AutoStatusConfig;
use crate::error::AutoStatusResult;
use crate::evaluator::{EventKind, SkipReason, TicketStatusEvent};
use crate::events::{
    DomainEvent, FollowupAdded, ItilKind, TaskAdded, TicketCreated, TimerStarted, TimerStopped,
};

/// What an adapter decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Evaluate(TicketStatusEvent),
    Skip(SkipReason),
}

/// Route a domain event to its adapter.
pub fn plan(
    config: &AutoStatusConfig,
    event: &DomainEvent,
    classifier: &TechnicianClassifier,
) -> AutoStatusResult<Plan> {
    Ok(match event {
        DomainEvent::TicketCreated(e) => on_ticket_created(config, e),
        DomainEvent::TaskAdded(e) => on_task_added(config, e),
        DomainEvent::FollowupAdded(e) => on_followup_added(config, e, classifier)?,
        DomainEvent::TimerStarted(e) => on_timer_started(config, e),
        DomainEvent::TimerStopped(e) => on_timer_stopped(config, e),
    })
}

pub fn on_ticket_created(config: &AutoStatusConfig, event: &TicketCreated) -> Plan {
    if !config.oncreate_enabled {
        return disabled(EventKind::OnCreate);
    }
    Plan::Evaluate(TicketStatusEvent::new(
        EventKind::OnCreate,
        event.ticket_id,
        config.oncreate_status,
    ))
}

pub fn on_task_added(config: &AutoStatusConfig, event: &TaskAdded) -> Plan {
    if !config.ontask_enabled {
        return disabled(EventKind::OnTask);
    }
    if config.ignore_private_tasks && event.is_private {
        return Plan::Skip(SkipReason::PrivateItem);
    }
    Plan::Evaluate(TicketStatusEvent::new(
        EventKind::OnTask,
        event.ticket_id,
        config.ontask_status,
    ))
}

/// Followups pick between two statuses by author when split routing is on:
/// technician → `onfollowup_status_other`, anyone else →
/// `onfollowup_status_requester`.
pub fn on_followup_added(
    config: &AutoStatusConfig,
    event: &FollowupAdded,
    classifier: &TechnicianClassifier,
) -> AutoStatusResult<Plan> {
    if !config.onfollowup_enabled {
        return Ok(disabled(EventKind::OnFollowup));
    }
    if config.ignore_private_followups && event.is_private {
        return Ok(Plan::Skip(SkipReason::PrivateItem));
    }
    if event.item_kind != ItilKind::Ticket {
        return Ok(Plan::Skip(SkipReason::NotATicket));
    }
    let ticket_id = event.item_id;
    if ticket_id <= 0 {
        return Ok(Plan::Skip(SkipReason::InvalidTicketId { ticket_id }));
    }

    let target = if config.followup_split_by_author {
        if classifier.is_technician(event.author_id, ticket_id)? {
            config.onfollowup_status_other
        } else {
            config.onfollowup_status_requester
        }
    } else {
        config.onfollowup_status
    };

    Ok(Plan::Evaluate(TicketStatusEvent::new(
        EventKind::OnFollowup,
        ticket_id,
        target,
    )))
}

pub fn on_timer_started(config: &AutoStatusConfig, event: &TimerStarted) -> Plan {
    if !config.actualtime_enabled {
        return Plan::Skip(SkipReason::TimerIntegrationOff);
    }
    Plan::Evaluate(TicketStatusEvent::new(
        EventKind::OnTimerStart,
        event.ticket_id,
        config.actualtime_status_running,
    ))
}

/// A stop does not downgrade the ticket while someone else is still working
/// on it, unless `actualtime_stop_only_if_no_timer` is off.
pub fn on_timer_stopped(config: &AutoStatusConfig, event: &TimerStopped) -> Plan {
    if !config.actualtime_enabled {
        return Plan::Skip(SkipReason::TimerIntegrationOff);
    }
    if config.actualtime_stop_only_if_no_timer && event.other_timer_running {
        return Plan::Skip(SkipReason::OtherTimerRunning {
            ticket_id: event.ticket_id,
        });
    }
    Plan::Evaluate(TicketStatusEvent::new(
        EventKind::OnTimerStop,
        event.ticket_id,
        config.actualtime_status_stopped,
    ))
}

fn disabled(event_kind: EventKind) -> Plan {
    Plan::Skip(SkipReason::RuleDisabled { event_kind })
}

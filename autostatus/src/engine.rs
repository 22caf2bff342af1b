//! AutoStatus Engine: event entry point
//!
//! Loads the configuration fresh for every event, runs the matching adapter
//! and hands the result to the [`RuleEvaluator`]. Everything runs
//! synchronously inside the caller's request.
//!
//! Timer stops are checked against every registered [`RunningTimerLookup`]
//! at decision time; the flag carried on the event can only make the
//! check stricter.

use std::sync::Arc;

use tracing::debug;

use crate::adapters::{self, Plan};
use crate::classifier::{RoleResolver, TechnicianClassifier};
use crate::config::{self, AutoStatusConfig, ConfigStore};
use crate::error::AutoStatusResult;
use crate::evaluator::{Outcome, RuleEvaluator};
use crate::events::{DomainEvent, TimerStopped};
use crate::ticket::{TicketId, TicketRepository};
use crate::timer::RunningTimerLookup;

/// Shared reference to an engine
pub type SharedEngine = Arc<AutoStatusEngine>;

pub struct AutoStatusEngine {
    config_store: Arc<dyn ConfigStore>,
    evaluator: RuleEvaluator,
    classifier: TechnicianClassifier,
    running_timers: Vec<Arc<dyn RunningTimerLookup>>,
}

impl AutoStatusEngine {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        tickets: Arc<dyn TicketRepository>,
        roles: Arc<dyn RoleResolver>,
    ) -> Self {
        Self {
            config_store,
            evaluator: RuleEvaluator::new(tickets.clone()),
            classifier: TechnicianClassifier::new(roles, tickets),
            running_timers: Vec::new(),
        }
    }

    /// Register a source of running timers consulted on every timer stop.
    pub fn with_running_timers(mut self, lookup: Arc<dyn RunningTimerLookup>) -> Self {
        self.running_timers.push(lookup);
        self
    }

    /// Create a shared reference to this engine
    pub fn shared(self) -> SharedEngine {
        Arc::new(self)
    }

    /// Current configuration, read from the store.
    pub fn config(&self) -> AutoStatusResult<AutoStatusConfig> {
        config::load_config(self.config_store.as_ref())
    }

    /// Handle one domain event with a freshly loaded configuration.
    pub fn handle(&self, event: &DomainEvent) -> AutoStatusResult<Outcome> {
        let config = self.config()?;
        self.handle_with(&config, event)
    }

    /// Handle one domain event with an explicit configuration.
    pub fn handle_with(
        &self,
        config: &AutoStatusConfig,
        event: &DomainEvent,
    ) -> AutoStatusResult<Outcome> {
        let event = &self.resolve_running_timers(config, *event)?;
        match adapters::plan(config, event, &self.classifier)? {
            Plan::Evaluate(status_event) => self.evaluator.apply(config, &status_event),
            Plan::Skip(reason) => {
                debug!(event = event.event_type(), %reason, "Event ignored by adapter");
                Ok(Outcome::skipped(reason))
            }
        }
    }

    /// Whether any registered lookup sees a running timer on the ticket.
    pub fn ticket_has_running_timer(&self, ticket_id: TicketId) -> AutoStatusResult<bool> {
        for lookup in &self.running_timers {
            if lookup.ticket_has_running_timer(ticket_id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn resolve_running_timers(
        &self,
        config: &AutoStatusConfig,
        event: DomainEvent,
    ) -> AutoStatusResult<DomainEvent> {
        match event {
            DomainEvent::TimerStopped(stopped)
                if config.actualtime_enabled
                    && config.actualtime_stop_only_if_no_timer
                    && !stopped.other_timer_running =>
            {
                let other_timer_running = self.ticket_has_running_timer(stopped.ticket_id)?;
                Ok(DomainEvent::TimerStopped(TimerStopped {
                    other_timer_running,
                    ..stopped
                }))
            }
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{TaskAdded, TicketCreated};
    use crate::evaluator::SkipReason;
    use crate::memory::{
        MemoryConfigStore, MemoryExternalTimers, MemoryRoleResolver, MemoryTicketRepository,
    };
    use crate::status::{ASSIGNED, NEW, WAITING};

    #[test]
    fn test_reads_config_fresh_per_event() {
        let store = Arc::new(MemoryConfigStore::new());
        let tickets = Arc::new(MemoryTicketRepository::new());
        tickets.insert(1, NEW, 0);
        let engine = AutoStatusEngine::new(
            store.clone(),
            tickets.clone(),
            Arc::new(MemoryRoleResolver::new()),
        );

        let created = DomainEvent::TicketCreated(TicketCreated { ticket_id: 1 });
        assert!(!engine.handle(&created).unwrap().is_applied());

        store.set("oncreate_status", "2");
        assert!(engine.handle(&created).unwrap().is_applied());
        assert_eq!(tickets.status_of(1), Some(ASSIGNED));
    }

    #[test]
    fn test_adapter_skip_is_reported() {
        let store = Arc::new(MemoryConfigStore::new());
        store.set("ontask_enabled", "0");
        let tickets = Arc::new(MemoryTicketRepository::new());
        tickets.insert(1, NEW, 0);
        let engine = AutoStatusEngine::new(store, tickets.clone(), Arc::new(MemoryRoleResolver::new()));

        let outcome = engine
            .handle(&DomainEvent::TaskAdded(TaskAdded {
                task_id: 1,
                ticket_id: 1,
                is_private: false,
            }))
            .unwrap();
        assert!(outcome.skip_reason().is_some());
        assert_eq!(tickets.find_calls(), 0);
    }

    #[test]
    fn test_stop_checks_registered_timers() {
        let store = Arc::new(MemoryConfigStore::new());
        store.set("actualtime_enabled", "1");
        let tickets = Arc::new(MemoryTicketRepository::new());
        tickets.insert(10, ASSIGNED, 0);
        let external = Arc::new(MemoryExternalTimers::new(true));
        external.link_task(100, 10);
        external.set_running(100, true);
        let engine = AutoStatusEngine::new(
            store.clone(),
            tickets.clone(),
            Arc::new(MemoryRoleResolver::new()),
        )
        .with_running_timers(external.clone());

        let stopped: DomainEvent =
            serde_json::from_str(r#"{"type":"timer_stopped","ticket_id":10}"#).unwrap();
        assert_eq!(
            engine.handle(&stopped).unwrap().skip_reason(),
            Some(&SkipReason::OtherTimerRunning { ticket_id: 10 })
        );
        assert_eq!(tickets.status_of(10), Some(ASSIGNED));

        store.set("actualtime_stop_only_if_no_timer", "0");
        assert!(engine.handle(&stopped).unwrap().is_applied());
        assert_eq!(tickets.status_of(10), Some(WAITING));
    }

    #[test]
    fn test_stop_applies_once_no_timer_runs() {
        let store = Arc::new(MemoryConfigStore::new());
        store.set("actualtime_enabled", "1");
        let tickets = Arc::new(MemoryTicketRepository::new());
        tickets.insert(10, ASSIGNED, 0);
        let external = Arc::new(MemoryExternalTimers::new(true));
        external.link_task(100, 10);
        let engine = AutoStatusEngine::new(store, tickets.clone(), Arc::new(MemoryRoleResolver::new()))
            .with_running_timers(external);

        let stopped = DomainEvent::TimerStopped(TimerStopped {
            ticket_id: 10,
            other_timer_running: false,
        });
        assert!(engine.handle(&stopped).unwrap().is_applied());
        assert_eq!(tickets.status_of(10), Some(WAITING));
    }
}

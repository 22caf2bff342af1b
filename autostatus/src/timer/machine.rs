//! Timer State Machine
//!
//! Per (subject, owner): Idle → Running → Idle. Ended sessions stay in the
//! store as history. Each transition on a ticket task is followed by a
//! synthetic timer event dispatched through the engine; the session write
//! is not rolled back if that dispatch fails.

use std::sync::Arc;

use tracing::info;

use super::store::{
    subject_entity, Clock, RunningTimerLookup, StoreRunningTimers, SubjectDirectory, TimerStore,
};
use super::types::{NewTimerSession, SubjectRecord, SubjectRef, TimerSession, TimerStateView};
use crate::classifier::RoleResolver;
use crate::engine::SharedEngine;
use crate::error::{AutoStatusError, AutoStatusResult};
use crate::evaluator::Outcome;
use crate::events::{DomainEvent, TimerStarted, TimerStopped};
use crate::ticket::{TicketId, UserId};

/// Result of a successful start or stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerTransition {
    pub session: TimerSession,
    /// Engine outcome for the emitted event; `None` when the subject has no
    /// ticket to drive.
    pub outcome: Option<Outcome>,
}

pub struct TimerStateMachine {
    store: Arc<dyn TimerStore>,
    subjects: Arc<dyn SubjectDirectory>,
    roles: Arc<dyn RoleResolver>,
    engine: SharedEngine,
    clock: Arc<dyn Clock>,
}

impl TimerStateMachine {
    pub fn new(
        store: Arc<dyn TimerStore>,
        subjects: Arc<dyn SubjectDirectory>,
        roles: Arc<dyn RoleResolver>,
        engine: SharedEngine,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            subjects,
            roles,
            engine,
            clock,
        }
    }

    /// Start a session for `user_id` on `subject`.
    pub fn start(&self, subject: SubjectRef, user_id: UserId) -> AutoStatusResult<TimerTransition> {
        let record = self.require_subject(subject)?;

        let assigned_elsewhere = record
            .assigned_user_id
            .is_some_and(|owner| owner > 0 && owner != user_id);
        if assigned_elsewhere || !self.roles.can_update_subject(user_id, &record)? {
            return Err(denied(user_id, "start", subject));
        }

        if self.store.find_running(subject, Some(user_id))?.is_some() {
            return Err(AutoStatusError::AlreadyRunning {
                kind: subject.kind,
                subject_id: subject.id,
                user_id,
            });
        }

        let session = self.store.insert(NewTimerSession {
            subject,
            owner_user_id: user_id,
            started_at: self.clock.now(),
        })?;
        info!(
            session_id = session.id,
            kind = %subject.kind,
            subject_id = subject.id,
            user_id,
            "Timer started"
        );

        let outcome = match record.ticket() {
            Some(ticket_id) => Some(
                self.engine
                    .handle(&DomainEvent::TimerStarted(TimerStarted { ticket_id }))?,
            ),
            None => None,
        };

        Ok(TimerTransition { session, outcome })
    }

    /// Stop the caller's running session on `subject`.
    ///
    /// Only the session owner may stop it; a session run by someone else
    /// yields `PermissionDenied` and stays running.
    pub fn stop(&self, subject: SubjectRef, user_id: UserId) -> AutoStatusResult<TimerTransition> {
        let record = self.require_subject(subject)?;

        let running = match self.store.find_running(subject, Some(user_id))? {
            Some(session) => session,
            None => {
                if self.store.find_running(subject, None)?.is_some() {
                    return Err(denied(user_id, "stop", subject));
                }
                return Err(AutoStatusError::NoRunningSession {
                    kind: subject.kind,
                    subject_id: subject.id,
                });
            }
        };

        let ended_at = self.clock.now();
        let accumulated = running.elapsed_at(ended_at);
        let session = self.store.close(running.id, ended_at, accumulated)?;
        info!(
            session_id = session.id,
            kind = %subject.kind,
            subject_id = subject.id,
            user_id,
            accumulated_seconds = accumulated,
            "Timer stopped"
        );

        let outcome = match record.ticket() {
            Some(ticket_id) => {
                let other_timer_running = self.ticket_has_running_timer(ticket_id)?;
                Some(self.engine.handle(&DomainEvent::TimerStopped(TimerStopped {
                    ticket_id,
                    other_timer_running,
                }))?)
            }
            None => None,
        };

        Ok(TimerTransition { session, outcome })
    }

    /// Current timer state of a subject. Pure read.
    pub fn get_state(&self, subject: SubjectRef) -> AutoStatusResult<TimerStateView> {
        let sessions = self.store.sessions_for(subject)?;
        Ok(TimerStateView::from_sessions(&sessions, self.clock.now()))
    }

    /// Whether any running session, on any task and by any owner, belongs
    /// to `ticket_id`. Always read fresh from the store.
    pub fn ticket_has_running_timer(&self, ticket_id: TicketId) -> AutoStatusResult<bool> {
        self.running_timers().ticket_has_running_timer(ticket_id)
    }

    /// Lookup over this machine's store, for registering with an engine.
    pub fn running_timers(&self) -> StoreRunningTimers {
        StoreRunningTimers::new(self.store.clone(), self.subjects.clone())
    }

    fn require_subject(&self, subject: SubjectRef) -> AutoStatusResult<SubjectRecord> {
        if subject.id <= 0 {
            return Err(AutoStatusError::not_found(subject_entity(subject.kind), subject.id));
        }
        self.subjects
            .find_subject(subject)?
            .ok_or_else(|| AutoStatusError::not_found(subject_entity(subject.kind), subject.id))
    }
}

fn denied(user_id: UserId, action: &'static str, subject: SubjectRef) -> AutoStatusError {
    AutoStatusError::PermissionDenied {
        user_id,
        action,
        kind: subject.kind,
        subject_id: subject.id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AutoStatusEngine;
    use crate::evaluator::SkipReason;
    use crate::memory::{
        ManualClock, MemoryConfigStore, MemoryRoleResolver, MemorySubjectDirectory,
        MemoryTicketRepository, MemoryTimerStore, ProfileAssignment,
    };
    use crate::status::{ASSIGNED, NEW, WAITING};
    use crate::timer::SubjectKind;

    struct Fixture {
        machine: TimerStateMachine,
        tickets: Arc<MemoryTicketRepository>,
        store: Arc<MemoryTimerStore>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let config = Arc::new(MemoryConfigStore::new());
        config.set("actualtime_enabled", "1");
        let tickets = Arc::new(MemoryTicketRepository::new());
        tickets.insert(10, NEW, 0);
        let roles = Arc::new(MemoryRoleResolver::new());
        roles.assign(ProfileAssignment::technician(1, 0));
        roles.assign(ProfileAssignment::technician(2, 0));
        let subjects = Arc::new(MemorySubjectDirectory::new());
        subjects.add_ticket_task(100, 10, Some(1));
        subjects.add_ticket_task(101, 10, None);
        subjects.add(SubjectRecord {
            kind: SubjectKind::ProblemTask,
            id: 200,
            ticket_id: None,
            assigned_user_id: None,
            entity_id: 0,
        });
        let store = Arc::new(MemoryTimerStore::new());
        let clock = Arc::new(ManualClock::default());
        let engine = AutoStatusEngine::new(config, tickets.clone(), roles.clone()).shared();
        let machine = TimerStateMachine::new(
            store.clone(),
            subjects,
            roles,
            engine,
            clock.clone(),
        );
        Fixture {
            machine,
            tickets,
            store,
            clock,
        }
    }

    #[test]
    fn test_start_stop_cycle() {
        let f = fixture();
        let task = SubjectRef::task(100);

        let started = f.machine.start(task, 1).unwrap();
        assert!(started.session.is_running());
        assert!(started.outcome.unwrap().is_applied());
        assert_eq!(f.tickets.status_of(10), Some(ASSIGNED));
        assert!(f.machine.get_state(task).unwrap().running);

        f.clock.advance(125);
        let stopped = f.machine.stop(task, 1).unwrap();
        assert_eq!(stopped.session.accumulated_seconds, 125);
        assert!(stopped.outcome.unwrap().is_applied());
        assert_eq!(f.tickets.status_of(10), Some(WAITING));

        f.clock.advance(1_000);
        let state = f.machine.get_state(task).unwrap();
        assert!(!state.running);
        assert_eq!(state.accumulated_seconds, 125);
        assert_eq!(state.total_seconds, 125);
    }

    #[test]
    fn test_second_start_is_already_running() {
        let f = fixture();
        let task = SubjectRef::task(101);
        f.machine.start(task, 1).unwrap();
        let err = f.machine.start(task, 1).unwrap_err();
        assert_eq!(err.code(), "ALREADY_RUNNING");
        assert_eq!(f.store.sessions_for(task).unwrap().len(), 1);
    }

    #[test]
    fn test_assigned_owner_required() {
        let f = fixture();
        let err = f.machine.start(SubjectRef::task(100), 2).unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");
    }

    #[test]
    fn test_user_without_rights_cannot_start() {
        let f = fixture();
        let err = f.machine.start(SubjectRef::task(101), 9).unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");
    }

    #[test]
    fn test_non_owner_stop_leaves_session_running() {
        let f = fixture();
        let task = SubjectRef::task(101);
        f.machine.start(task, 1).unwrap();
        let err = f.machine.stop(task, 2).unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");
        assert!(f.machine.get_state(task).unwrap().running);
    }

    #[test]
    fn test_stop_without_session() {
        let f = fixture();
        let err = f.machine.stop(SubjectRef::task(101), 1).unwrap_err();
        assert_eq!(err.code(), "NO_RUNNING_SESSION");
    }

    #[test]
    fn test_missing_subject() {
        let f = fixture();
        assert_eq!(
            f.machine.start(SubjectRef::task(999), 1).unwrap_err().code(),
            "NOT_FOUND"
        );
        assert_eq!(
            f.machine.stop(SubjectRef::task(0), 1).unwrap_err().code(),
            "NOT_FOUND"
        );
    }

    #[test]
    fn test_stop_keeps_status_while_other_task_runs() {
        let f = fixture();
        f.machine.start(SubjectRef::task(100), 1).unwrap();
        f.machine.start(SubjectRef::task(101), 2).unwrap();

        let stopped = f.machine.stop(SubjectRef::task(100), 1).unwrap();
        assert_eq!(
            stopped.outcome.unwrap().skip_reason(),
            Some(&SkipReason::OtherTimerRunning { ticket_id: 10 })
        );
        assert_eq!(f.tickets.status_of(10), Some(ASSIGNED));

        f.machine.stop(SubjectRef::task(101), 2).unwrap();
        assert_eq!(f.tickets.status_of(10), Some(WAITING));
    }

    #[test]
    fn test_non_ticket_subject_emits_nothing() {
        let f = fixture();
        let subject = SubjectRef::new(SubjectKind::ProblemTask, 200);
        let started = f.machine.start(subject, 1).unwrap();
        assert!(started.outcome.is_none());
        assert!(f.tickets.updates().is_empty());
    }

    #[test]
    fn test_ticket_has_running_timer() {
        let f = fixture();
        assert!(!f.machine.ticket_has_running_timer(10).unwrap());
        f.machine.start(SubjectRef::task(101), 2).unwrap();
        assert!(f.machine.ticket_has_running_timer(10).unwrap());
        assert!(!f.machine.ticket_has_running_timer(11).unwrap());
        assert!(!f.machine.ticket_has_running_timer(0).unwrap());
    }
}

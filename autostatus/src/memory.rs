//! In-memory collaborators
//!
//! Mutex-backed implementations of every host seam. The CLI replays events
//! against them and the tests use them as recording fakes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::bridge::ExternalTimerSource;
use crate::classifier::{RoleResolver, RoleScope};
use crate::config::{ConfigStore, SettingsMap};
use crate::error::{AutoStatusError, AutoStatusResult};
use crate::status::{StatusId, StatusVocabulary};
use crate::ticket::{EntityId, TicketId, TicketRepository, TicketSnapshot, UserId};
use crate::timer::{
    Clock, NewTimerSession, RunningTimerLookup, SessionId, SubjectDirectory, SubjectKind,
    SubjectRecord, SubjectRef, TimerLedger, TimerSession, TimerStore,
};

/// Ticket-ownership right bit on a profile
pub const OWN_RIGHT: u32 = 32768;
/// Generic update right bit on a profile
pub const UPDATE_RIGHT: u32 = 2;
/// Generic read right bit on a profile
pub const READ_RIGHT: u32 = 1;

fn lock<T>(mutex: &Mutex<T>) -> AutoStatusResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| AutoStatusError::storage("in-memory store lock poisoned"))
}

/// Lock for fixture setup, where a poisoned lock means an earlier panic
/// already broke the fixture.
fn lock_for_setup<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("in-memory fixture lock poisoned")
}

// ── Configuration ──

#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    values: Mutex<SettingsMap>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: SettingsMap) -> Self {
        Self {
            values: Mutex::new(values),
        }
    }

    /// Write one raw value, as an administrator would.
    pub fn set(&self, key: &str, value: &str) {
        lock_for_setup(&self.values).insert(key.to_string(), value.to_string());
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> AutoStatusResult<SettingsMap> {
        Ok(lock(&self.values)?.clone())
    }

    fn save(&self, values: &SettingsMap) -> AutoStatusResult<()> {
        let mut stored = lock(&self.values)?;
        for (key, value) in values {
            stored.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn delete(&self, keys: &[&str]) -> AutoStatusResult<()> {
        let mut stored = lock(&self.values)?;
        for key in keys {
            stored.remove(*key);
        }
        Ok(())
    }
}

// ── Tickets ──

#[derive(Debug, Default)]
struct TicketState {
    tickets: BTreeMap<TicketId, TicketSnapshot>,
    updates: Vec<(TicketId, StatusId)>,
    find_calls: usize,
    failure: Option<String>,
    vocabulary: Option<StatusVocabulary>,
}

impl TicketState {
    fn check(&self) -> AutoStatusResult<()> {
        match &self.failure {
            Some(message) => Err(AutoStatusError::storage(message.clone())),
            None => Ok(()),
        }
    }
}

/// Ticket repository that records every status write.
#[derive(Debug, Default)]
pub struct MemoryTicketRepository {
    state: Mutex<TicketState>,
}

impl MemoryTicketRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ticket_id: TicketId, status: StatusId, entity_id: EntityId) {
        lock_for_setup(&self.state).tickets.insert(
            ticket_id,
            TicketSnapshot {
                ticket_id,
                current_status: status,
                entity_id,
            },
        );
    }

    /// Replace the stock status vocabulary.
    pub fn set_statuses(&self, vocabulary: StatusVocabulary) {
        lock_for_setup(&self.state).vocabulary = Some(vocabulary);
    }

    /// Make every later call fail with a storage error.
    pub fn fail_with(&self, message: &str) {
        lock_for_setup(&self.state).failure = Some(message.to_string());
    }

    /// Status writes in call order.
    pub fn updates(&self) -> Vec<(TicketId, StatusId)> {
        self.state
            .lock()
            .map(|s| s.updates.clone())
            .unwrap_or_default()
    }

    pub fn status_of(&self, ticket_id: TicketId) -> Option<StatusId> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.tickets.get(&ticket_id).map(|t| t.current_status))
    }

    pub fn find_calls(&self) -> usize {
        self.state.lock().map(|s| s.find_calls).unwrap_or(0)
    }

    pub fn tickets(&self) -> Vec<TicketSnapshot> {
        self.state
            .lock()
            .map(|s| s.tickets.values().copied().collect())
            .unwrap_or_default()
    }
}

impl TicketRepository for MemoryTicketRepository {
    fn find(&self, ticket_id: TicketId) -> AutoStatusResult<Option<TicketSnapshot>> {
        let mut state = lock(&self.state)?;
        state.find_calls += 1;
        state.check()?;
        Ok(state.tickets.get(&ticket_id).copied())
    }

    fn update_status(&self, ticket_id: TicketId, status: StatusId) -> AutoStatusResult<()> {
        let mut state = lock(&self.state)?;
        state.check()?;
        let ticket = state
            .tickets
            .get_mut(&ticket_id)
            .ok_or_else(|| AutoStatusError::not_found("ticket", ticket_id))?;
        ticket.current_status = status;
        state.updates.push((ticket_id, status));
        Ok(())
    }

    fn statuses(&self) -> AutoStatusResult<StatusVocabulary> {
        let state = lock(&self.state)?;
        state.check()?;
        Ok(state.vocabulary.clone().unwrap_or_default())
    }
}

// ── Roles ──

/// A profile held by a user on an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileAssignment {
    pub user_id: UserId,
    pub entity_id: EntityId,
    #[serde(default)]
    pub recursive: bool,
    /// Ticket rights bitmask of the profile
    pub rights: u32,
}

impl ProfileAssignment {
    /// Profile with ownership and update rights.
    pub fn technician(user_id: UserId, entity_id: EntityId) -> Self {
        Self {
            user_id,
            entity_id,
            recursive: false,
            rights: OWN_RIGHT | UPDATE_RIGHT | READ_RIGHT,
        }
    }

    /// Read-only requester profile.
    pub fn self_service(user_id: UserId, entity_id: EntityId) -> Self {
        Self {
            user_id,
            entity_id,
            recursive: false,
            rights: READ_RIGHT,
        }
    }

    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    pub fn has_right(&self, right: u32) -> bool {
        self.rights & right != 0
    }
}

/// Role resolver over a list of profile assignments.
#[derive(Debug, Default)]
pub struct MemoryRoleResolver {
    assignments: Mutex<Vec<ProfileAssignment>>,
}

impl MemoryRoleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&self, assignment: ProfileAssignment) {
        lock_for_setup(&self.assignments).push(assignment);
    }

    fn any(&self, user_id: UserId, scope: RoleScope, right: u32) -> AutoStatusResult<bool> {
        Ok(lock(&self.assignments)?.iter().any(|a| {
            a.user_id == user_id && a.has_right(right) && scope.covers(a.entity_id, a.recursive)
        }))
    }
}

impl RoleResolver for MemoryRoleResolver {
    fn holds_ticket_ownership(&self, user_id: UserId, scope: RoleScope) -> AutoStatusResult<bool> {
        self.any(user_id, scope, OWN_RIGHT)
    }

    fn can_update_subject(
        &self,
        user_id: UserId,
        subject: &SubjectRecord,
    ) -> AutoStatusResult<bool> {
        if user_id <= 0 {
            return Ok(false);
        }
        self.any(user_id, RoleScope::Entity(subject.entity_id), UPDATE_RIGHT)
    }
}

// ── Subjects ──

#[derive(Debug, Default)]
pub struct MemorySubjectDirectory {
    subjects: Mutex<BTreeMap<(SubjectKind, i64), SubjectRecord>>,
}

impl MemorySubjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, record: SubjectRecord) {
        lock_for_setup(&self.subjects).insert((record.kind, record.id), record);
    }

    /// Register a ticket task on the root entity.
    pub fn add_ticket_task(&self, task_id: i64, ticket_id: TicketId, assigned: Option<UserId>) {
        self.add(SubjectRecord {
            kind: SubjectKind::TicketTask,
            id: task_id,
            ticket_id: Some(ticket_id),
            assigned_user_id: assigned,
            entity_id: 0,
        });
    }
}

impl SubjectDirectory for MemorySubjectDirectory {
    fn find_subject(&self, subject: SubjectRef) -> AutoStatusResult<Option<SubjectRecord>> {
        Ok(lock(&self.subjects)?.get(&(subject.kind, subject.id)).copied())
    }
}

// ── Timer sessions ──

#[derive(Debug, Default)]
pub struct MemoryTimerStore {
    ledger: Mutex<TimerLedger>,
}

impl MemoryTimerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sessions(&self) -> Vec<TimerSession> {
        self.ledger
            .lock()
            .map(|l| l.sessions().to_vec())
            .unwrap_or_default()
    }
}

impl TimerStore for MemoryTimerStore {
    fn insert(&self, session: NewTimerSession) -> AutoStatusResult<TimerSession> {
        lock(&self.ledger)?.insert(session)
    }

    fn close(
        &self,
        session_id: SessionId,
        ended_at: DateTime<Utc>,
        accumulated_seconds: i64,
    ) -> AutoStatusResult<TimerSession> {
        lock(&self.ledger)?.close(session_id, ended_at, accumulated_seconds)
    }

    fn sessions_for(&self, subject: SubjectRef) -> AutoStatusResult<Vec<TimerSession>> {
        Ok(lock(&self.ledger)?.sessions_for(subject))
    }

    fn running_sessions(&self) -> AutoStatusResult<Vec<TimerSession>> {
        Ok(lock(&self.ledger)?.running())
    }
}

// ── External tracker ──

#[derive(Debug, Default)]
struct ExternalState {
    available: bool,
    task_tickets: BTreeMap<i64, TicketId>,
    running_tasks: BTreeSet<i64>,
}

/// Stand-in for a third-party timer tracker.
#[derive(Debug, Default)]
pub struct MemoryExternalTimers {
    state: Mutex<ExternalState>,
}

impl MemoryExternalTimers {
    pub fn new(available: bool) -> Self {
        Self {
            state: Mutex::new(ExternalState {
                available,
                ..Default::default()
            }),
        }
    }

    pub fn set_available(&self, available: bool) {
        lock_for_setup(&self.state).available = available;
    }

    pub fn link_task(&self, task_id: i64, ticket_id: TicketId) {
        lock_for_setup(&self.state).task_tickets.insert(task_id, ticket_id);
    }

    /// Mark the tracker row on `task_id` as running or ended.
    pub fn set_running(&self, task_id: i64, running: bool) {
        let mut state = lock_for_setup(&self.state);
        if running {
            state.running_tasks.insert(task_id);
        } else {
            state.running_tasks.remove(&task_id);
        }
    }
}

impl ExternalTimerSource for MemoryExternalTimers {
    fn is_available(&self) -> bool {
        self.state.lock().map(|s| s.available).unwrap_or(false)
    }

    fn ticket_of_task(&self, task_id: i64) -> AutoStatusResult<Option<TicketId>> {
        Ok(lock(&self.state)?.task_tickets.get(&task_id).copied())
    }
}

impl RunningTimerLookup for MemoryExternalTimers {
    fn ticket_has_running_timer(&self, ticket_id: TicketId) -> AutoStatusResult<bool> {
        let state = lock(&self.state)?;
        Ok(state
            .running_tasks
            .iter()
            .any(|task| state.task_tickets.get(task) == Some(&ticket_id)))
    }
}

// ── Clock ──

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, seconds: i64) {
        *lock_for_setup(&self.now) += Duration::seconds(seconds);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *lock_for_setup(&self.now) = at;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        let start = Utc
            .timestamp_opt(1_700_000_000, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::new(start)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}

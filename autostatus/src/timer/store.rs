//! Timer persistence and host lookups used by the state machine
//!
//! [`TimerLedger`] holds the session rows and enforces the row rules shared
//! by every store; [`JsonFileTimerStore`] persists a ledger to disk after each
//! mutation.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{NewTimerSession, SessionId, SubjectKind, SubjectRecord, SubjectRef, TimerSession};
use crate::error::{AutoStatusError, AutoStatusResult};
use crate::ticket::{TicketId, UserId};

/// Persistent timer sessions.
pub trait TimerStore: Send + Sync {
    /// Insert a running session and return the stored row.
    fn insert(&self, session: NewTimerSession) -> AutoStatusResult<TimerSession>;

    /// End a session, freezing its accumulated seconds.
    fn close(
        &self,
        session_id: SessionId,
        ended_at: DateTime<Utc>,
        accumulated_seconds: i64,
    ) -> AutoStatusResult<TimerSession>;

    /// Every session (running or ended) for one subject.
    fn sessions_for(&self, subject: SubjectRef) -> AutoStatusResult<Vec<TimerSession>>;

    /// Every running session across all subjects.
    fn running_sessions(&self) -> AutoStatusResult<Vec<TimerSession>>;

    /// The running session for `subject`, optionally restricted to one owner.
    fn find_running(
        &self,
        subject: SubjectRef,
        owner: Option<UserId>,
    ) -> AutoStatusResult<Option<TimerSession>> {
        Ok(self
            .sessions_for(subject)?
            .into_iter()
            .filter(|s| s.is_running())
            .filter(|s| owner.map_or(true, |o| s.owner_user_id == o))
            .max_by_key(|s| s.started_at))
    }
}

/// Host lookup of timer subjects.
pub trait SubjectDirectory: Send + Sync {
    fn find_subject(&self, subject: SubjectRef) -> AutoStatusResult<Option<SubjectRecord>>;
}

/// Fresh answer to whether any timer is still running on a ticket.
pub trait RunningTimerLookup: Send + Sync {
    fn ticket_has_running_timer(&self, ticket_id: TicketId) -> AutoStatusResult<bool>;
}

/// Running-timer lookup over a [`TimerStore`], mapping sessions to tickets
/// through the [`SubjectDirectory`].
#[derive(Clone)]
pub struct StoreRunningTimers {
    store: Arc<dyn TimerStore>,
    subjects: Arc<dyn SubjectDirectory>,
}

impl StoreRunningTimers {
    pub fn new(store: Arc<dyn TimerStore>, subjects: Arc<dyn SubjectDirectory>) -> Self {
        Self { store, subjects }
    }
}

impl RunningTimerLookup for StoreRunningTimers {
    fn ticket_has_running_timer(&self, ticket_id: TicketId) -> AutoStatusResult<bool> {
        if ticket_id <= 0 {
            return Ok(false);
        }
        for session in self.store.running_sessions()? {
            let record = self.subjects.find_subject(session.subject())?;
            if record.and_then(|r| r.ticket()) == Some(ticket_id) {
                debug!(ticket_id, session_id = session.id, "Ticket still has a running timer");
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Session rows plus the next id to hand out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerLedger {
    next_id: SessionId,
    sessions: Vec<TimerSession>,
}

impl TimerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sessions(&self) -> &[TimerSession] {
        &self.sessions
    }

    /// At most one running session per (subject, owner).
    pub fn insert(&mut self, new: NewTimerSession) -> AutoStatusResult<TimerSession> {
        let duplicate = self.sessions.iter().any(|s| {
            s.is_running() && s.subject() == new.subject && s.owner_user_id == new.owner_user_id
        });
        if duplicate {
            return Err(AutoStatusError::AlreadyRunning {
                kind: new.subject.kind,
                subject_id: new.subject.id,
                user_id: new.owner_user_id,
            });
        }

        self.next_id = self.next_id.max(self.max_id()) + 1;
        let session = TimerSession {
            id: self.next_id,
            subject_kind: new.subject.kind,
            subject_id: new.subject.id,
            owner_user_id: new.owner_user_id,
            started_at: new.started_at,
            ended_at: None,
            accumulated_seconds: 0,
        };
        self.sessions.push(session.clone());
        Ok(session)
    }

    pub fn close(
        &mut self,
        session_id: SessionId,
        ended_at: DateTime<Utc>,
        accumulated_seconds: i64,
    ) -> AutoStatusResult<TimerSession> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| AutoStatusError::not_found("timer session", session_id))?;

        if !session.is_running() {
            return Err(AutoStatusError::NoRunningSession {
                kind: session.subject_kind,
                subject_id: session.subject_id,
            });
        }

        session.ended_at = Some(ended_at);
        session.accumulated_seconds = accumulated_seconds.max(0);
        Ok(session.clone())
    }

    pub fn sessions_for(&self, subject: SubjectRef) -> Vec<TimerSession> {
        self.sessions
            .iter()
            .filter(|s| s.subject() == subject)
            .cloned()
            .collect()
    }

    pub fn running(&self) -> Vec<TimerSession> {
        self.sessions.iter().filter(|s| s.is_running()).cloned().collect()
    }

    fn max_id(&self) -> SessionId {
        self.sessions.iter().map(|s| s.id).max().unwrap_or(0)
    }
}

/// Timer store backed by a JSON file, rewritten after every mutation.
pub struct JsonFileTimerStore {
    path: PathBuf,
    ledger: Mutex<TimerLedger>,
}

impl JsonFileTimerStore {
    /// Open the store, loading existing sessions if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> AutoStatusResult<Self> {
        let path = path.into();
        let ledger = load_ledger(&path)?.unwrap_or_default();
        debug!(path = %path.display(), sessions = ledger.sessions.len(), "Opened timer store");
        Ok(Self {
            path,
            ledger: Mutex::new(ledger),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read<T>(&self, f: impl FnOnce(&TimerLedger) -> T) -> AutoStatusResult<T> {
        Ok(f(&*self.lock()?))
    }

    /// Apply `f` to a copy of the ledger and keep the copy only once it is on
    /// disk, so a failed save leaves memory matching the file.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut TimerLedger) -> AutoStatusResult<T>,
    ) -> AutoStatusResult<T> {
        let mut ledger = self.lock()?;
        let mut next = ledger.clone();
        let result = f(&mut next)?;
        save_ledger(&next, &self.path)?;
        *ledger = next;
        Ok(result)
    }

    fn lock(&self) -> AutoStatusResult<std::sync::MutexGuard<'_, TimerLedger>> {
        self.ledger
            .lock()
            .map_err(|_| AutoStatusError::storage("timer store lock poisoned"))
    }
}

impl TimerStore for JsonFileTimerStore {
    fn insert(&self, session: NewTimerSession) -> AutoStatusResult<TimerSession> {
        self.mutate(|ledger| ledger.insert(session))
    }

    fn close(
        &self,
        session_id: SessionId,
        ended_at: DateTime<Utc>,
        accumulated_seconds: i64,
    ) -> AutoStatusResult<TimerSession> {
        self.mutate(|ledger| ledger.close(session_id, ended_at, accumulated_seconds))
    }

    fn sessions_for(&self, subject: SubjectRef) -> AutoStatusResult<Vec<TimerSession>> {
        self.read(|ledger| ledger.sessions_for(subject))
    }

    fn running_sessions(&self) -> AutoStatusResult<Vec<TimerSession>> {
        self.read(|ledger| ledger.running())
    }
}

/// Save a ledger to a JSON file.
///
/// Writes a sibling temp file and renames it over `path`, so readers never
/// see a half-written ledger.
pub fn save_ledger(ledger: &TimerLedger, path: &Path) -> AutoStatusResult<()> {
    let json = serde_json::to_string_pretty(ledger)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    if let Err(e) = std::fs::write(&tmp, json) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a ledger from a JSON file
pub fn load_ledger(path: &Path) -> AutoStatusResult<Option<TimerLedger>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(path)?;
    let ledger: TimerLedger = serde_json::from_str(&json)?;
    Ok(Some(ledger))
}

/// Entity name used in not-found errors for a subject kind.
pub fn subject_entity(kind: SubjectKind) -> &'static str {
    match kind {
        SubjectKind::TicketTask => "ticket task",
        SubjectKind::ProblemTask => "problem task",
        SubjectKind::ChangeTask => "change task",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn new_session(task: i64, owner: i64, start: i64) -> NewTimerSession {
        NewTimerSession {
            subject: SubjectRef::task(task),
            owner_user_id: owner,
            started_at: at(start),
        }
    }

    #[test]
    fn test_ledger_rejects_second_running_session_for_owner() {
        let mut ledger = TimerLedger::new();
        ledger.insert(new_session(1, 5, 0)).unwrap();
        let err = ledger.insert(new_session(1, 5, 10)).unwrap_err();
        assert_eq!(err.code(), "ALREADY_RUNNING");

        // another owner on the same task is fine
        ledger.insert(new_session(1, 6, 10)).unwrap();
        assert_eq!(ledger.running().len(), 2);
    }

    #[test]
    fn test_ledger_close_freezes_duration() {
        let mut ledger = TimerLedger::new();
        let s = ledger.insert(new_session(1, 5, 0)).unwrap();
        let closed = ledger.close(s.id, at(42), 42).unwrap();
        assert_eq!(closed.accumulated_seconds, 42);
        assert!(!closed.is_running());

        let err = ledger.close(s.id, at(50), 50).unwrap_err();
        assert_eq!(err.code(), "NO_RUNNING_SESSION");
        assert_eq!(ledger.close(99, at(50), 0).unwrap_err().code(), "NOT_FOUND");
    }

    #[test]
    fn test_ledger_ids_increase() {
        let mut ledger = TimerLedger::new();
        let a = ledger.insert(new_session(1, 5, 0)).unwrap();
        let b = ledger.insert(new_session(2, 5, 0)).unwrap();
        assert!(b.id > a.id);
    }

    #[test]
    fn test_json_store_persists_across_open() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("timers.json");

        let store = JsonFileTimerStore::open(&path).unwrap();
        let s = store.insert(new_session(3, 5, 0)).unwrap();
        store.close(s.id, at(30), 30).unwrap();
        store.insert(new_session(3, 6, 40)).unwrap();
        drop(store);

        let reopened = JsonFileTimerStore::open(&path).unwrap();
        let sessions = reopened.sessions_for(SubjectRef::task(3)).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(reopened.running_sessions().unwrap().len(), 1);
        let running = reopened
            .find_running(SubjectRef::task(3), Some(6))
            .unwrap()
            .unwrap();
        assert_eq!(running.started_at, at(40));
        assert!(reopened
            .find_running(SubjectRef::task(3), Some(5))
            .unwrap()
            .is_none());

        // ids keep increasing after reload
        let next = reopened.insert(new_session(4, 5, 50)).unwrap();
        assert!(next.id > running.id);
    }

    #[test]
    fn test_json_store_failed_save_changes_nothing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("missing_dir").join("timers.json");
        let store = JsonFileTimerStore::open(&path).unwrap();

        let err = store.insert(new_session(3, 5, 0)).unwrap_err();
        assert_eq!(err.code(), "IO_ERROR");
        assert!(store.running_sessions().unwrap().is_empty());
        assert!(store
            .find_running(SubjectRef::task(3), Some(5))
            .unwrap()
            .is_none());
        assert!(!path.exists());

        // once the directory exists the same insert goes through with id 1
        std::fs::create_dir(path.parent().unwrap()).unwrap();
        let session = store.insert(new_session(3, 5, 0)).unwrap();
        assert_eq!(session.id, 1);
        assert!(path.exists());
    }

    #[test]
    fn test_json_store_failed_close_keeps_session_running() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("store");
        std::fs::create_dir(&dir).unwrap();
        let path = dir.join("timers.json");
        let store = JsonFileTimerStore::open(&path).unwrap();
        let session = store.insert(new_session(3, 5, 0)).unwrap();

        std::fs::remove_dir_all(&dir).unwrap();
        assert!(store.close(session.id, at(30), 30).is_err());
        assert_eq!(store.running_sessions().unwrap().len(), 1);
    }

    #[test]
    fn test_json_store_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = JsonFileTimerStore::open(tmp.path().join("none.json")).unwrap();
        assert!(store.running_sessions().unwrap().is_empty());
    }
}

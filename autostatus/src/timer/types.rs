//! Core types for timer sessions
//!
//! A session row records one user working one subject. `ended_at == None`
//! means the session is running.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AutoStatusError, AutoStatusResult};
use crate::ticket::{EntityId, TicketId, UserId};

/// Timer session row identifier
pub type SessionId = i64;

/// Kind of work item a timer is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SubjectKind {
    TicketTask,
    ProblemTask,
    ChangeTask,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TicketTask => "TicketTask",
            Self::ProblemTask => "ProblemTask",
            Self::ChangeTask => "ChangeTask",
        }
    }

    /// Parse the wire name used by the timer API.
    pub fn parse(raw: &str) -> AutoStatusResult<Self> {
        match raw {
            "TicketTask" => Ok(Self::TicketTask),
            "ProblemTask" => Ok(Self::ProblemTask),
            "ChangeTask" => Ok(Self::ChangeTask),
            other => Err(AutoStatusError::invalid_request(format!(
                "unknown subject kind '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a timer subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub kind: SubjectKind,
    pub id: i64,
}

impl SubjectRef {
    pub fn new(kind: SubjectKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn task(id: i64) -> Self {
        Self::new(SubjectKind::TicketTask, id)
    }
}

/// What the host knows about a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub kind: SubjectKind,
    pub id: i64,
    /// Parent ticket for ticket tasks
    #[serde(default)]
    pub ticket_id: Option<TicketId>,
    /// Technician the task is assigned to, if any
    #[serde(default)]
    pub assigned_user_id: Option<UserId>,
    #[serde(default)]
    pub entity_id: EntityId,
}

impl SubjectRecord {
    pub fn subject(&self) -> SubjectRef {
        SubjectRef::new(self.kind, self.id)
    }

    /// Ticket whose status this subject drives. Only ticket tasks have one.
    pub fn ticket(&self) -> Option<TicketId> {
        match self.kind {
            SubjectKind::TicketTask => self.ticket_id.filter(|id| *id > 0),
            SubjectKind::ProblemTask | SubjectKind::ChangeTask => None,
        }
    }
}

/// A persisted timer session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSession {
    pub id: SessionId,
    pub subject_kind: SubjectKind,
    pub subject_id: i64,
    pub owner_user_id: UserId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Frozen when the session ends; `0` while running
    pub accumulated_seconds: i64,
}

impl TimerSession {
    pub fn is_running(&self) -> bool {
        self.ended_at.is_none()
    }

    pub fn subject(&self) -> SubjectRef {
        SubjectRef::new(self.subject_kind, self.subject_id)
    }

    /// Seconds elapsed up to `now` for a running session, clamped at zero.
    pub fn elapsed_at(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_seconds().max(0)
    }
}

/// Row to insert when a session starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewTimerSession {
    pub subject: SubjectRef,
    pub owner_user_id: UserId,
    pub started_at: DateTime<Utc>,
}

/// Timer state for one subject, as shown to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerStateView {
    pub running: bool,
    pub running_owner: Option<UserId>,
    pub running_since_epoch: Option<i64>,
    /// Sum of all ended sessions
    pub accumulated_seconds: i64,
    /// `accumulated_seconds` plus the running session's elapsed time
    pub total_seconds: i64,
}

impl TimerStateView {
    pub fn idle() -> Self {
        Self {
            running: false,
            running_owner: None,
            running_since_epoch: None,
            accumulated_seconds: 0,
            total_seconds: 0,
        }
    }

    /// Compute the view from every session of one subject.
    ///
    /// If several sessions are running (different owners), the most recently
    /// started one is reported.
    pub fn from_sessions(sessions: &[TimerSession], now: DateTime<Utc>) -> Self {
        let accumulated_seconds: i64 = sessions
            .iter()
            .filter(|s| !s.is_running())
            .map(|s| s.accumulated_seconds)
            .sum();

        let running = sessions
            .iter()
            .filter(|s| s.is_running())
            .max_by_key(|s| s.started_at);

        match running {
            Some(session) => Self {
                running: true,
                running_owner: Some(session.owner_user_id),
                running_since_epoch: Some(session.started_at.timestamp()),
                accumulated_seconds,
                total_seconds: accumulated_seconds + session.elapsed_at(now),
            },
            None => Self {
                accumulated_seconds,
                total_seconds: accumulated_seconds,
                ..Self::idle()
            },
        }
    }

    /// `total_seconds` as `HH:MM:SS`.
    pub fn display(&self) -> String {
        format_seconds(self.total_seconds)
    }
}

/// Format seconds as `HH:MM:SS`; hours are not capped, negatives show as zero.
pub fn format_seconds(total_seconds: i64) -> String {
    let seconds = total_seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn session(id: i64, owner: i64, start: i64, end: Option<i64>) -> TimerSession {
        TimerSession {
            id,
            subject_kind: SubjectKind::TicketTask,
            subject_id: 1,
            owner_user_id: owner,
            started_at: at(start),
            ended_at: end.map(at),
            accumulated_seconds: end.map(|e| e - start).unwrap_or(0),
        }
    }

    #[test]
    fn test_subject_kind_parse() {
        assert_eq!(SubjectKind::parse("TicketTask").unwrap(), SubjectKind::TicketTask);
        let err = SubjectKind::parse("ticket_task").unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[test]
    fn test_only_ticket_tasks_drive_tickets() {
        let mut record = SubjectRecord {
            kind: SubjectKind::TicketTask,
            id: 5,
            ticket_id: Some(9),
            assigned_user_id: None,
            entity_id: 0,
        };
        assert_eq!(record.ticket(), Some(9));
        record.kind = SubjectKind::ProblemTask;
        assert_eq!(record.ticket(), None);
        record.kind = SubjectKind::TicketTask;
        record.ticket_id = Some(0);
        assert_eq!(record.ticket(), None);
    }

    #[test]
    fn test_view_idle_and_completed() {
        assert_eq!(TimerStateView::from_sessions(&[], at(0)), TimerStateView::idle());

        let sessions = vec![session(1, 3, 0, Some(90)), session(2, 3, 100, Some(130))];
        let view = TimerStateView::from_sessions(&sessions, at(10_000));
        assert!(!view.running);
        assert_eq!(view.accumulated_seconds, 120);
        assert_eq!(view.total_seconds, 120);
    }

    #[test]
    fn test_view_running_adds_elapsed() {
        let sessions = vec![session(1, 3, 0, Some(60)), session(2, 4, 100, None)];
        let view = TimerStateView::from_sessions(&sessions, at(145));
        assert!(view.running);
        assert_eq!(view.running_owner, Some(4));
        assert_eq!(view.running_since_epoch, Some(at(100).timestamp()));
        assert_eq!(view.accumulated_seconds, 60);
        assert_eq!(view.total_seconds, 105);
    }

    #[test]
    fn test_elapsed_clamped_for_clock_skew() {
        let s = session(1, 3, 100, None);
        assert_eq!(s.elapsed_at(at(100) - Duration::seconds(30)), 0);
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0), "00:00:00");
        assert_eq!(format_seconds(3_725), "01:02:05");
        assert_eq!(format_seconds(360_000), "100:00:00");
        assert_eq!(format_seconds(-5), "00:00:00");
    }
}

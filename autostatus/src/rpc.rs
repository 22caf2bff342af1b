//! Timer API
//!
//! Request/response boundary over the [`TimerStateMachine`]. Precondition
//! failures come back as `ok: false` responses with a short message; only
//! storage-level failures are returned as errors.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AutoStatusError, AutoStatusResult};
use crate::ticket::UserId;
use crate::timer::{SubjectKind, SubjectRef, TimerStateMachine, TimerStateView};

/// Timer action requested by a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerAction {
    Start,
    Stop,
}

impl TimerAction {
    pub fn parse(raw: &str) -> AutoStatusResult<Self> {
        match raw {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            other => Err(AutoStatusError::invalid_request(format!(
                "unknown action '{}'",
                other
            ))),
        }
    }
}

/// Raw request, fields as received
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRequest {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub subject_id: i64,
    #[serde(default)]
    pub subject_kind: String,
}

impl TimerRequest {
    pub fn new(action: &str, subject_kind: SubjectKind, subject_id: i64) -> Self {
        Self {
            action: action.to_string(),
            subject_id,
            subject_kind: subject_kind.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerResponse {
    pub ok: bool,
    pub message: String,
    /// Fresh state of the subject, present on every response
    pub state: TimerStateView,
}

pub struct TimerApi {
    machine: TimerStateMachine,
}

impl TimerApi {
    pub fn new(machine: TimerStateMachine) -> Self {
        Self { machine }
    }

    pub fn machine(&self) -> &TimerStateMachine {
        &self.machine
    }

    pub fn handle(&self, user_id: UserId, request: &TimerRequest) -> AutoStatusResult<TimerResponse> {
        let subject = SubjectKind::parse(&request.subject_kind)
            .ok()
            .map(|kind| SubjectRef::new(kind, request.subject_id));

        let result = TimerAction::parse(&request.action).and_then(|action| {
            let subject = subject.ok_or_else(|| {
                AutoStatusError::invalid_request(format!(
                    "unknown subject kind '{}'",
                    request.subject_kind
                ))
            })?;
            match action {
                TimerAction::Start => self.machine.start(subject, user_id),
                TimerAction::Stop => self.machine.stop(subject, user_id),
            }
        });

        let (ok, message) = match result {
            Ok(transition) => {
                let message = if transition.session.is_running() {
                    "Timer started"
                } else {
                    "Timer stopped"
                };
                (true, message.to_string())
            }
            Err(e) if e.is_fatal() => {
                warn!(error = %e, user_id, "Timer request failed");
                return Err(e);
            }
            Err(e) => {
                debug!(error = %e, code = e.code(), user_id, "Timer request rejected");
                // a repeated start leaves the UI in the state it asked for
                let ok = matches!(e, AutoStatusError::AlreadyRunning { .. });
                (ok, e.user_message())
            }
        };

        let state = match subject {
            Some(subject) => self.machine.get_state(subject)?,
            None => TimerStateView::idle(),
        };

        Ok(TimerResponse { ok, message, state })
    }
}

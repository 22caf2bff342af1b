//! External Timer Bridge
//!
//! Turns add/update notifications from a third-party timer tracker into the
//! same timer events the internal state machine emits. The tracker owns its
//! rows; the bridge only looks at the `begin`/`end` fields it is handed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::SharedEngine;
use crate::error::AutoStatusResult;
use crate::evaluator::{Outcome, SkipReason};
use crate::events::{DomainEvent, TimerStarted, TimerStopped};
use crate::ticket::TicketId;
use crate::timer::{RunningTimerLookup, SubjectKind};

/// Read access to the external tracker.
///
/// Its [`RunningTimerLookup`] answers whether any tracker row on any task
/// of the ticket has no end yet.
pub trait ExternalTimerSource: RunningTimerLookup {
    /// Whether the tracker is installed and its storage reachable.
    fn is_available(&self) -> bool;

    /// Parent ticket of a ticket task.
    fn ticket_of_task(&self, task_id: i64) -> AutoStatusResult<Option<TicketId>>;
}

/// One tracker row as seen in a notification.
///
/// Empty strings count as unset, the way the tracker stores cleared times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTimerRecord {
    pub item_kind: String,
    pub item_id: i64,
    #[serde(default)]
    pub begin: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

impl ExternalTimerRecord {
    pub fn has_begin(&self) -> bool {
        is_set(&self.begin)
    }

    pub fn has_end(&self) -> bool {
        is_set(&self.end)
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ExternalTimerNotification {
    Added {
        record: ExternalTimerRecord,
    },
    Updated {
        record: ExternalTimerRecord,
        /// Names of the fields the update touched
        #[serde(default)]
        changed_fields: Vec<String>,
    },
}

impl ExternalTimerNotification {
    pub fn record(&self) -> &ExternalTimerRecord {
        match self {
            Self::Added { record } | Self::Updated { record, .. } => record,
        }
    }
}

/// What a notification means for the ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Start,
    Stop,
}

pub struct ExternalTimerBridge {
    source: Arc<dyn ExternalTimerSource>,
    engine: SharedEngine,
}

impl ExternalTimerBridge {
    pub fn new(source: Arc<dyn ExternalTimerSource>, engine: SharedEngine) -> Self {
        Self { source, engine }
    }

    pub fn handle(&self, notification: &ExternalTimerNotification) -> AutoStatusResult<Outcome> {
        let config = self.engine.config()?;
        if !config.actualtime_enabled {
            return Ok(Outcome::skipped(SkipReason::TimerIntegrationOff));
        }
        if !self.source.is_available() {
            warn!("External timer source unavailable, ignoring notification");
            return Ok(Outcome::skipped(SkipReason::TimerIntegrationOff));
        }

        let record = notification.record();
        debug!(
            item_kind = %record.item_kind,
            item_id = record.item_id,
            begin = record.begin.as_deref().unwrap_or(""),
            end = record.end.as_deref().unwrap_or(""),
            ?notification,
            "External timer notification"
        );

        if record.item_kind != SubjectKind::TicketTask.as_str() {
            return Ok(Outcome::skipped(SkipReason::NotATicket));
        }
        if record.item_id <= 0 {
            return Ok(Outcome::skipped(SkipReason::InvalidTaskId {
                task_id: record.item_id,
            }));
        }

        let transition = match classify(notification) {
            Some(transition) => transition,
            None => return Ok(Outcome::skipped(SkipReason::IrrelevantTimerChange)),
        };

        let ticket_id = match self.source.ticket_of_task(record.item_id)? {
            Some(id) if id > 0 => id,
            other => {
                return Ok(Outcome::skipped(SkipReason::InvalidTicketId {
                    ticket_id: other.unwrap_or(0),
                }))
            }
        };

        let event = match transition {
            Transition::Start => DomainEvent::TimerStarted(TimerStarted { ticket_id }),
            Transition::Stop => {
                let other_timer_running = config.actualtime_stop_only_if_no_timer
                    && self.source.ticket_has_running_timer(ticket_id)?;
                DomainEvent::TimerStopped(TimerStopped {
                    ticket_id,
                    other_timer_running,
                })
            }
        };
        self.engine.handle_with(&config, &event)
    }
}

/// Add with a begin and no end starts. An update touching `end` stops when
/// the end is now set and restarts when it was cleared. An update touching
/// only `begin` starts if there is no end. Anything else is bookkeeping.
fn classify(notification: &ExternalTimerNotification) -> Option<Transition> {
    match notification {
        ExternalTimerNotification::Added { record } => {
            (record.has_begin() && !record.has_end()).then_some(Transition::Start)
        }
        ExternalTimerNotification::Updated {
            record,
            changed_fields,
        } => {
            let touched = |field: &str| changed_fields.iter().any(|f| f == field);
            if touched("end") {
                if record.has_end() {
                    Some(Transition::Stop)
                } else {
                    Some(Transition::Start)
                }
            } else if touched("begin") && record.has_begin() && !record.has_end() {
                Some(Transition::Start)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(begin: Option<&str>, end: Option<&str>) -> ExternalTimerRecord {
        ExternalTimerRecord {
            item_kind: "TicketTask".to_string(),
            item_id: 5,
            begin: begin.map(str::to_string),
            end: end.map(str::to_string),
        }
    }

    fn updated(begin: Option<&str>, end: Option<&str>, fields: &[&str]) -> ExternalTimerNotification {
        ExternalTimerNotification::Updated {
            record: record(begin, end),
            changed_fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn test_add_with_begin_only_starts() {
        let added = ExternalTimerNotification::Added {
            record: record(Some("2024-01-01 10:00:00"), None),
        };
        assert_eq!(classify(&added), Some(Transition::Start));

        let finished = ExternalTimerNotification::Added {
            record: record(Some("2024-01-01 10:00:00"), Some("2024-01-01 11:00:00")),
        };
        assert_eq!(classify(&finished), None);

        let blank = ExternalTimerNotification::Added {
            record: record(Some(""), None),
        };
        assert_eq!(classify(&blank), None);
    }

    #[test]
    fn test_update_end_transitions() {
        assert_eq!(
            classify(&updated(Some("b"), Some("e"), &["end"])),
            Some(Transition::Stop)
        );
        assert_eq!(
            classify(&updated(Some("b"), Some(""), &["end"])),
            Some(Transition::Start)
        );
        assert_eq!(
            classify(&updated(Some("b"), None, &["begin"])),
            Some(Transition::Start)
        );
        assert_eq!(classify(&updated(Some("b"), Some("e"), &["begin"])), None);
        assert_eq!(classify(&updated(Some("b"), None, &["actiontime"])), None);
    }

    #[test]
    fn test_wire_format() {
        let json = r#"{"change":"updated","record":{"item_kind":"TicketTask","item_id":5,"begin":"b","end":"e"},"changed_fields":["end"]}"#;
        let parsed: ExternalTimerNotification = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, updated(Some("b"), Some("e"), &["end"]));
    }
}

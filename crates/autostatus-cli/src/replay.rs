//! Line-delimited JSON replay
//!
//! Each input line is one envelope; each produces exactly one output line.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use autostatus::{AutoStatusError, DomainEvent, ExternalTimerNotification, TimerRequest, UserId};

use crate::host::Host;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Event {
        event: DomainEvent,
    },
    Timer {
        timer: TimerRequest,
        #[serde(default)]
        user_id: Option<UserId>,
    },
    External {
        external: ExternalTimerNotification,
    },
}

/// Totals printed at the end of a replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub lines: usize,
    pub errors: usize,
}

/// Process one envelope. Library errors become an `error` object.
pub fn process(host: &Host, envelope: &Envelope, default_user: UserId) -> Value {
    let result = match envelope {
        Envelope::Event { event } => host
            .engine
            .handle(event)
            .and_then(|outcome| Ok(serde_json::to_value(outcome)?)),
        Envelope::Timer { timer, user_id } => host
            .timers
            .handle(user_id.unwrap_or(default_user), timer)
            .and_then(|response| Ok(serde_json::to_value(response)?)),
        Envelope::External { external } => host
            .bridge
            .handle(external)
            .and_then(|outcome| Ok(serde_json::to_value(outcome)?)),
    };
    result.unwrap_or_else(|e| error_value(&e))
}

fn error_value(error: &AutoStatusError) -> Value {
    json!({ "error": error.to_structured() })
}

/// Read envelopes from `input` until EOF, writing one JSON line per input.
pub fn run(
    host: &Host,
    input: impl BufRead,
    mut output: impl Write,
    default_user: UserId,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary::default();
    for (index, line) in input.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;

        let value = match serde_json::from_str::<Envelope>(&line) {
            Ok(envelope) => process(host, &envelope, default_user),
            Err(e) => {
                warn!(line = index + 1, error = %e, "Malformed envelope");
                error_value(&AutoStatusError::invalid_request(e.to_string()))
            }
        };
        if value.get("error").is_some() {
            summary.errors += 1;
        }

        serde_json::to_writer(&mut output, &value).context("Failed to write result")?;
        writeln!(output).context("Failed to write result")?;
    }
    Ok(summary)
}

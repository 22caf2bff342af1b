//! Ticket status vocabulary and allow-list filters
//!
//! Status ids are positive integers owned by the host. Id `0` is reserved
//! for "do not change" and is never a valid transition target.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Ticket status identifier as stored by the host
pub type StatusId = i64;

/// Reserved "do not change" sentinel
pub const DO_NOT_CHANGE: StatusId = 0;
pub const NEW: StatusId = 1;
pub const ASSIGNED: StatusId = 2;
pub const PLANNED: StatusId = 3;
pub const WAITING: StatusId = 4;
pub const SOLVED: StatusId = 5;
pub const CLOSED: StatusId = 6;

/// Whether a status is terminal (solved or closed)
pub fn is_terminal(status: StatusId) -> bool {
    status == SOLVED || status == CLOSED
}

/// Known ticket statuses, id → label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusVocabulary {
    labels: BTreeMap<StatusId, String>,
}

impl StatusVocabulary {
    /// Build from a host-supplied map.
    ///
    /// An empty map falls back to the stock vocabulary. Non-positive ids are
    /// dropped; `0` is reintroduced only through [`StatusVocabulary::with_none`].
    pub fn from_map(labels: BTreeMap<StatusId, String>) -> Self {
        let labels: BTreeMap<StatusId, String> =
            labels.into_iter().filter(|(id, _)| *id > 0).collect();
        if labels.is_empty() {
            return Self::fallback();
        }
        Self { labels }
    }

    /// Stock vocabulary used when the host supplies none
    pub fn fallback() -> Self {
        let labels = [
            (NEW, "New"),
            (ASSIGNED, "Processing (assigned)"),
            (PLANNED, "Processing (planned)"),
            (WAITING, "Pending"),
            (SOLVED, "Solved"),
            (CLOSED, "Closed"),
        ]
        .into_iter()
        .map(|(id, label)| (id, label.to_string()))
        .collect();
        Self { labels }
    }

    /// Whether `status` is a valid transition target.
    pub fn contains(&self, status: StatusId) -> bool {
        status > 0 && self.labels.contains_key(&status)
    }

    pub fn label(&self, status: StatusId) -> Option<&str> {
        if status == DO_NOT_CHANGE {
            return Some("Do not change");
        }
        self.labels.get(&status).map(String::as_str)
    }

    /// Target choices: "Do not change" followed by every known status.
    pub fn with_none(&self) -> Vec<(StatusId, String)> {
        std::iter::once((DO_NOT_CHANGE, "Do not change".to_string()))
            .chain(self.filterable())
            .collect()
    }

    /// Choices for allow-list filters; the sentinel is never offered.
    pub fn filterable(&self) -> Vec<(StatusId, String)> {
        self.labels
            .iter()
            .map(|(id, label)| (*id, label.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for StatusVocabulary {
    fn default() -> Self {
        Self::fallback()
    }
}

/// Allow-list of current statuses parsed from a CSV option.
///
/// An empty list allows every status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusFilter {
    allowed: BTreeSet<StatusId>,
}

impl StatusFilter {
    /// Parse a comma-separated list of status ids.
    ///
    /// Parts are trimmed, empty parts dropped, each coerced with
    /// [`coerce_int`] and the result deduplicated.
    pub fn parse(csv: &str) -> Self {
        let allowed = csv
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(coerce_int)
            .collect();
        Self { allowed }
    }

    /// Build from an explicit selection, e.g. checked boxes of a settings form.
    pub fn from_ids(ids: impl IntoIterator<Item = StatusId>) -> Self {
        Self {
            allowed: ids.into_iter().collect(),
        }
    }

    pub fn allows(&self, current: StatusId) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&current)
    }

    pub fn ids(&self) -> &BTreeSet<StatusId> {
        &self.allowed
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Render back to normalized CSV: ascending, deduplicated.
    pub fn to_csv(&self) -> String {
        self.allowed
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Membership test straight from the stored CSV.
pub fn allows(current: StatusId, csv: &str) -> bool {
    StatusFilter::parse(csv).allows(current)
}

/// Loose integer coercion: optional sign followed by leading digits.
///
/// Anything without leading digits is `0`, matching how the host casts
/// stored option text to integers.
pub fn coerce_int(raw: &str) -> i64 {
    let raw = raw.trim();
    let (negative, digits) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let value = digits[..end].parse::<i64>().unwrap_or(0);
    if negative {
        -value
    } else {
        value
    }
}

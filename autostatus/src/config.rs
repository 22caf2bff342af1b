//! Configuration Snapshot: defaulted policy settings
//!
//! The host persists settings as a flat key/value map in the plugin's
//! namespace. [`AutoStatusConfig::from_values`] merges whatever is stored
//! over the compiled defaults, so a missing key never breaks evaluation.
//!
//! # Options
//!
//! | Key | Kind | Default |
//! |---|---|---|
//! | `ignore_solved_closed` | flag | `1` |
//! | `oncreate_enabled` / `oncreate_status` | flag / status | `1` / new |
//! | `oncreate_allowed_statuses` | CSV | `""` |
//! | `ontask_enabled` / `ontask_status` | flag / status | `1` / assigned |
//! | `ignore_private_tasks` | flag | `0` |
//! | `ontask_allowed_statuses` | CSV | `""` |
//! | `onfollowup_enabled` / `onfollowup_status` | flag / status | `1` / pending |
//! | `ignore_private_followups` | flag | `0` |
//! | `followup_split_by_author` | flag | `1` |
//! | `onfollowup_status_requester` / `onfollowup_status_other` | status | assigned / pending |
//! | `onfollowup_allowed_statuses` | CSV | `""` |
//! | `actualtime_enabled` | flag | `0` |
//! | `actualtime_status_running` / `actualtime_status_stopped` | status | assigned / pending |
//! | `actualtime_stop_only_if_no_timer` | flag | `1` |
//! | `actualtime_allowed_statuses_start` / `_stop` | CSV | `""` |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::AutoStatusResult;
use crate::status::{self, StatusFilter, StatusId};

/// Flat settings as the host stores them: every value is text.
pub type SettingsMap = BTreeMap<String, String>;

/// Host-side persistence for the plugin's settings namespace.
pub trait ConfigStore: Send + Sync {
    /// Read every stored option. Missing keys are simply absent.
    fn load(&self) -> AutoStatusResult<SettingsMap>;

    /// Write the given options, replacing existing values for those keys.
    fn save(&self, values: &SettingsMap) -> AutoStatusResult<()>;

    /// Remove the given keys.
    fn delete(&self, keys: &[&str]) -> AutoStatusResult<()>;
}

/// Typed view of the settings namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoStatusConfig {
    pub ignore_solved_closed: bool,

    pub oncreate_enabled: bool,
    pub oncreate_status: StatusId,
    pub oncreate_allowed_statuses: String,

    pub ontask_enabled: bool,
    pub ontask_status: StatusId,
    pub ignore_private_tasks: bool,
    pub ontask_allowed_statuses: String,

    pub onfollowup_enabled: bool,
    pub onfollowup_status: StatusId,
    pub ignore_private_followups: bool,
    pub followup_split_by_author: bool,
    /// Used when the followup author is not a technician
    pub onfollowup_status_requester: StatusId,
    /// Used when the followup author is a technician
    pub onfollowup_status_other: StatusId,
    pub onfollowup_allowed_statuses: String,

    pub actualtime_enabled: bool,
    pub actualtime_status_running: StatusId,
    pub actualtime_status_stopped: StatusId,
    pub actualtime_stop_only_if_no_timer: bool,
    pub actualtime_allowed_statuses_start: String,
    pub actualtime_allowed_statuses_stop: String,
}

impl Default for AutoStatusConfig {
    fn default() -> Self {
        Self {
            ignore_solved_closed: true,

            oncreate_enabled: true,
            oncreate_status: status::NEW,
            oncreate_allowed_statuses: String::new(),

            ontask_enabled: true,
            ontask_status: status::ASSIGNED,
            ignore_private_tasks: false,
            ontask_allowed_statuses: String::new(),

            onfollowup_enabled: true,
            onfollowup_status: status::WAITING,
            ignore_private_followups: false,
            followup_split_by_author: true,
            onfollowup_status_requester: status::ASSIGNED,
            onfollowup_status_other: status::WAITING,
            onfollowup_allowed_statuses: String::new(),

            actualtime_enabled: false,
            actualtime_status_running: status::ASSIGNED,
            actualtime_status_stopped: status::WAITING,
            actualtime_stop_only_if_no_timer: true,
            actualtime_allowed_statuses_start: String::new(),
            actualtime_allowed_statuses_stop: String::new(),
        }
    }
}

impl AutoStatusConfig {
    /// Every option key in the namespace.
    pub const KEYS: [&'static str; 21] = [
        "ignore_solved_closed",
        "oncreate_enabled",
        "oncreate_status",
        "oncreate_allowed_statuses",
        "ontask_enabled",
        "ontask_status",
        "ignore_private_tasks",
        "ontask_allowed_statuses",
        "onfollowup_enabled",
        "onfollowup_status",
        "ignore_private_followups",
        "followup_split_by_author",
        "onfollowup_status_requester",
        "onfollowup_status_other",
        "onfollowup_allowed_statuses",
        "actualtime_enabled",
        "actualtime_status_running",
        "actualtime_status_stopped",
        "actualtime_stop_only_if_no_timer",
        "actualtime_allowed_statuses_start",
        "actualtime_allowed_statuses_stop",
    ];

    /// Merge stored values over the defaults.
    ///
    /// Unknown keys are ignored; known keys with unparseable values coerce
    /// the way the host does (flags: empty or `0` is off; integers: leading
    /// digits or `0`).
    pub fn from_values(values: &SettingsMap) -> Self {
        let mut config = Self::default();
        for (key, raw) in values {
            if !config.set(key, raw) {
                debug!(key = %key, "Ignoring unknown autostatus option");
            }
        }
        config
    }

    /// Set one option from its stored text. Returns false for unknown keys.
    pub fn set(&mut self, key: &str, raw: &str) -> bool {
        match key {
            "ignore_solved_closed" => self.ignore_solved_closed = parse_flag(raw),

            "oncreate_enabled" => self.oncreate_enabled = parse_flag(raw),
            "oncreate_status" => self.oncreate_status = status::coerce_int(raw),
            "oncreate_allowed_statuses" => self.oncreate_allowed_statuses = raw.to_string(),

            "ontask_enabled" => self.ontask_enabled = parse_flag(raw),
            "ontask_status" => self.ontask_status = status::coerce_int(raw),
            "ignore_private_tasks" => self.ignore_private_tasks = parse_flag(raw),
            "ontask_allowed_statuses" => self.ontask_allowed_statuses = raw.to_string(),

            "onfollowup_enabled" => self.onfollowup_enabled = parse_flag(raw),
            "onfollowup_status" => self.onfollowup_status = status::coerce_int(raw),
            "ignore_private_followups" => self.ignore_private_followups = parse_flag(raw),
            "followup_split_by_author" => self.followup_split_by_author = parse_flag(raw),
            "onfollowup_status_requester" => {
                self.onfollowup_status_requester = status::coerce_int(raw)
            }
            "onfollowup_status_other" => self.onfollowup_status_other = status::coerce_int(raw),
            "onfollowup_allowed_statuses" => self.onfollowup_allowed_statuses = raw.to_string(),

            "actualtime_enabled" => self.actualtime_enabled = parse_flag(raw),
            "actualtime_status_running" => {
                self.actualtime_status_running = status::coerce_int(raw)
            }
            "actualtime_status_stopped" => {
                self.actualtime_status_stopped = status::coerce_int(raw)
            }
            "actualtime_stop_only_if_no_timer" => {
                self.actualtime_stop_only_if_no_timer = parse_flag(raw)
            }
            "actualtime_allowed_statuses_start" => {
                self.actualtime_allowed_statuses_start = raw.to_string()
            }
            "actualtime_allowed_statuses_stop" => {
                self.actualtime_allowed_statuses_stop = raw.to_string()
            }
            _ => return false,
        }
        true
    }

    /// Render every option back to stored text.
    ///
    /// Flags become `0`/`1` and CSV lists are normalized (ascending, deduplicated).
    pub fn to_values(&self) -> SettingsMap {
        let flag = |v: bool| if v { "1" } else { "0" }.to_string();
        let csv = |raw: &str| StatusFilter::parse(raw).to_csv();

        let entries = [
            ("ignore_solved_closed", flag(self.ignore_solved_closed)),
            ("oncreate_enabled", flag(self.oncreate_enabled)),
            ("oncreate_status", self.oncreate_status.to_string()),
            (
                "oncreate_allowed_statuses",
                csv(&self.oncreate_allowed_statuses),
            ),
            ("ontask_enabled", flag(self.ontask_enabled)),
            ("ontask_status", self.ontask_status.to_string()),
            ("ignore_private_tasks", flag(self.ignore_private_tasks)),
            ("ontask_allowed_statuses", csv(&self.ontask_allowed_statuses)),
            ("onfollowup_enabled", flag(self.onfollowup_enabled)),
            ("onfollowup_status", self.onfollowup_status.to_string()),
            (
                "ignore_private_followups",
                flag(self.ignore_private_followups),
            ),
            (
                "followup_split_by_author",
                flag(self.followup_split_by_author),
            ),
            (
                "onfollowup_status_requester",
                self.onfollowup_status_requester.to_string(),
            ),
            (
                "onfollowup_status_other",
                self.onfollowup_status_other.to_string(),
            ),
            (
                "onfollowup_allowed_statuses",
                csv(&self.onfollowup_allowed_statuses),
            ),
            ("actualtime_enabled", flag(self.actualtime_enabled)),
            (
                "actualtime_status_running",
                self.actualtime_status_running.to_string(),
            ),
            (
                "actualtime_status_stopped",
                self.actualtime_status_stopped.to_string(),
            ),
            (
                "actualtime_stop_only_if_no_timer",
                flag(self.actualtime_stop_only_if_no_timer),
            ),
            (
                "actualtime_allowed_statuses_start",
                csv(&self.actualtime_allowed_statuses_start),
            ),
            (
                "actualtime_allowed_statuses_stop",
                csv(&self.actualtime_allowed_statuses_stop),
            ),
        ];

        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect()
    }

    /// Allow-list CSV for an event kind.
    pub fn allowed_statuses(&self, kind: crate::evaluator::EventKind) -> &str {
        use crate::evaluator::EventKind;
        match kind {
            EventKind::OnCreate => &self.oncreate_allowed_statuses,
            EventKind::OnTask => &self.ontask_allowed_statuses,
            EventKind::OnFollowup => &self.onfollowup_allowed_statuses,
            EventKind::OnTimerStart => &self.actualtime_allowed_statuses_start,
            EventKind::OnTimerStop => &self.actualtime_allowed_statuses_stop,
        }
    }
}

/// Read the settings namespace fresh and merge it over the defaults.
pub fn load_config(store: &dyn ConfigStore) -> AutoStatusResult<AutoStatusConfig> {
    let values = store.load()?;
    Ok(AutoStatusConfig::from_values(&values))
}

/// Write defaults for every option that is not stored yet.
///
/// Existing values are left untouched.
pub fn install_defaults(store: &dyn ConfigStore) -> AutoStatusResult<SettingsMap> {
    let stored = store.load()?;
    let missing: SettingsMap = AutoStatusConfig::default()
        .to_values()
        .into_iter()
        .filter(|(key, _)| !stored.contains_key(key))
        .collect();
    if !missing.is_empty() {
        store.save(&missing)?;
    }
    Ok(missing)
}

/// Remove every option of the namespace.
pub fn uninstall(store: &dyn ConfigStore) -> AutoStatusResult<()> {
    store.delete(&AutoStatusConfig::KEYS)
}

/// Loose flag parsing: empty or `0` is off, anything else is on.
pub fn parse_flag(raw: &str) -> bool {
    let raw = raw.trim();
    !(raw.is_empty() || raw == "0")
}

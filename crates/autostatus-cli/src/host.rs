//! Host snapshot: tickets, tasks, profiles and tracker state loaded from JSON
//! into the in-memory collaborators.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use autostatus::memory::{
    MemoryExternalTimers, MemoryRoleResolver, MemorySubjectDirectory, MemoryTicketRepository,
    MemoryTimerStore, ProfileAssignment,
};
use autostatus::timer::TimerStore;
use autostatus::{
    AutoStatusEngine, ConfigStore, ExternalTimerBridge, JsonFileTimerStore, StatusId,
    StatusVocabulary, StoreRunningTimers, SubjectRecord, SystemClock, TicketSnapshot, TimerApi,
    TimerStateMachine,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostSnapshot {
    #[serde(default)]
    pub tickets: Vec<TicketSnapshot>,
    /// Timer subjects (ticket, problem and change tasks)
    #[serde(default)]
    pub tasks: Vec<SubjectRecord>,
    #[serde(default)]
    pub profiles: Vec<ProfileAssignment>,
    /// Status labels; the stock vocabulary when absent
    #[serde(default)]
    pub statuses: Option<BTreeMap<StatusId, String>>,
    #[serde(default)]
    pub external: ExternalTracker,
}

/// State of the third-party timer tracker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalTracker {
    #[serde(default)]
    pub available: bool,
    /// Ticket tasks with an open tracker row
    #[serde(default)]
    pub running_tasks: Vec<i64>,
}

impl HostSnapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read host snapshot {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse host snapshot {}", path.display()))
    }
}

/// Everything a replay needs, wired together.
pub struct Host {
    pub tickets: Arc<MemoryTicketRepository>,
    pub engine: autostatus::SharedEngine,
    pub timers: TimerApi,
    pub bridge: ExternalTimerBridge,
}

impl Host {
    pub fn build(
        snapshot: &HostSnapshot,
        config: Arc<dyn ConfigStore>,
        timer_path: Option<PathBuf>,
    ) -> Result<Self> {
        let tickets = Arc::new(MemoryTicketRepository::new());
        for ticket in &snapshot.tickets {
            tickets.insert(ticket.ticket_id, ticket.current_status, ticket.entity_id);
        }
        if let Some(labels) = &snapshot.statuses {
            tickets.set_statuses(StatusVocabulary::from_map(labels.clone()));
        }

        let roles = Arc::new(MemoryRoleResolver::new());
        for profile in &snapshot.profiles {
            roles.assign(*profile);
        }

        let subjects = Arc::new(MemorySubjectDirectory::new());
        let external = Arc::new(MemoryExternalTimers::new(snapshot.external.available));
        for task in &snapshot.tasks {
            subjects.add(*task);
            if let Some(ticket_id) = task.ticket() {
                external.link_task(task.id, ticket_id);
            }
        }
        for task_id in &snapshot.external.running_tasks {
            external.set_running(*task_id, true);
        }

        let store: Arc<dyn TimerStore> = match timer_path {
            Some(path) => Arc::new(
                JsonFileTimerStore::open(&path)
                    .with_context(|| format!("Failed to open timer store {}", path.display()))?,
            ),
            None => Arc::new(MemoryTimerStore::new()),
        };

        let engine = AutoStatusEngine::new(config, tickets.clone(), roles.clone())
            .with_running_timers(Arc::new(StoreRunningTimers::new(
                store.clone(),
                subjects.clone(),
            )))
            .with_running_timers(external.clone())
            .shared();
        let machine = TimerStateMachine::new(
            store,
            subjects,
            roles,
            engine.clone(),
            Arc::new(SystemClock),
        );
        let bridge = ExternalTimerBridge::new(external, engine.clone());

        Ok(Self {
            tickets,
            engine,
            timers: TimerApi::new(machine),
            bridge,
        })
    }
}

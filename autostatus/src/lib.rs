//! AutoStatus Library
//!
//! Moves support tickets between statuses when things happen to them:
//! - Ticket created, task added, followup added
//! - Work timer started or stopped on a ticket task
//! - Start/stop notifications from an external timer tracker
//!
//! # Flow
//!
//! ```text
//! DomainEvent ─▶ adapters ─▶ RuleEvaluator ─▶ TicketRepository::update_status
//!                   ▲
//! TimerApi ─▶ TimerStateMachine ─┘        ExternalTimerBridge ─┘
//! ```
//!
//! Every rule reads a fresh [`AutoStatusConfig`] from the [`ConfigStore`].
//! Rules that decide not to act return [`Outcome::Skipped`] with a reason;
//! only storage failures surface as errors.
//!
//! The host owns tickets, tasks, roles and settings. It plugs in through the
//! traits in [`config`], [`ticket`], [`classifier`], [`timer`] and [`bridge`];
//! [`memory`] has in-process implementations of all of them.

#![allow(clippy::uninlined_format_args)]

pub mod adapters;
pub mod bridge;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod memory;
pub mod rpc;
pub mod status;
pub mod ticket;
pub mod timer;

pub use bridge::{
    ExternalTimerBridge, ExternalTimerNotification, ExternalTimerRecord, ExternalTimerSource,
};
pub use classifier::{RoleResolver, RoleScope, TechnicianClassifier};
pub use config::{
    install_defaults, load_config, uninstall, AutoStatusConfig, ConfigStore, SettingsMap,
};
pub use engine::{AutoStatusEngine, SharedEngine};
pub use error::{AutoStatusError, AutoStatusResult, StructuredError};
pub use evaluator::{EventKind, Outcome, RuleEvaluator, SkipReason, TicketStatusEvent};
pub use events::{
    DomainEvent, FollowupAdded, ItilKind, TaskAdded, TicketCreated, TimerStarted, TimerStopped,
};
pub use rpc::{TimerAction, TimerApi, TimerRequest, TimerResponse};
pub use status::{StatusFilter, StatusId, StatusVocabulary};
pub use ticket::{EntityId, TicketId, TicketRepository, TicketSnapshot, UserId};
pub use timer::{
    Clock, JsonFileTimerStore, RunningTimerLookup, StoreRunningTimers, SubjectDirectory,
    SubjectKind, SubjectRecord, SubjectRef, SystemClock, TimerSession, TimerStateMachine,
    TimerStateView, TimerStore,
};

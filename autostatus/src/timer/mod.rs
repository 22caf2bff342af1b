//! Work timers on tasks
//!
//! Sessions record who worked which subject and for how long. Starting or
//! stopping a session on a ticket task feeds a timer event back into the
//! engine.

pub mod machine;
pub mod store;
pub mod types;

pub use machine::{TimerStateMachine, TimerTransition};
pub use store::{
    load_ledger, save_ledger, Clock, JsonFileTimerStore, RunningTimerLookup, StoreRunningTimers,
    SubjectDirectory, SystemClock, TimerLedger, TimerStore,
};
pub use types::{
    format_seconds, NewTimerSession, SessionId, SubjectKind, SubjectRecord, SubjectRef,
    TimerSession, TimerStateView,
};

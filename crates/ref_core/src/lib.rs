//! # ref_core - Referee Match Timing Core
//!
//! Platform-neutral core of a referee's wrist app: wall-clock driven match
//! timer, lifecycle state machine, event ledger with penalty shootouts, and
//! durable completed-match history.
//!
//! ## Features
//! - Drift-free clocks recomputed from an injected time source
//! - Explicit, guarded phase transitions (nothing advances on its own)
//! - Completed matches persisted as MessagePack + LZ4 with a SHA-256 trailer
//! - Live state publishing and an external command channel for widgets

// Game-clock style APIs take many flags
#![allow(clippy::too_many_arguments)]
#![allow(clippy::new_without_default)]

pub mod capabilities;
pub mod clock;
pub mod completed;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod penalties;
pub mod publisher;
pub mod save;
pub mod session;
pub mod timer;

pub use error::{MatchError, Result};

// Re-export clock and configuration
pub use clock::{format_clock, ClockEngine, ManualTimeSource, SystemTimeSource, TimeSource};
pub use config::{CoreSettings, MatchConfiguration};

// Re-export the match model
pub use completed::{CompletedMatch, CompletedMatchSummary, SnapshotBuilder};
pub use events::{
    CardDetails, CardRecipient, CardType, EventLedger, GoalDetails, GoalType, MatchEventKind,
    MatchEventRecord, OfficialRole, PenaltyResult, Score, SubstitutionDetails, TeamSide,
};
pub use lifecycle::{LifecycleMachine, LifecyclePhase};
pub use penalties::{PenaltyShootout, PenaltyTally};
pub use session::{MatchChange, MatchObserver, MatchSession, MatchStatus};
pub use timer::{Boundary, MatchTimer, PeriodOutcome, TimerSnapshot};

// Re-export persistence and the outer surfaces
pub use capabilities::{Capabilities, HapticEvent, Platform, SyncNotice};
pub use publisher::{
    CommandHandler, FileCommandStore, FileLiveStateStore, LiveActivityCommand, LiveActivityState,
    LiveStatePublisher,
};
pub use save::{FileMatchHistoryStore, InMemoryMatchHistoryStore, MatchHistoryStore, SaveError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub use completed::SCHEMA_VERSION;

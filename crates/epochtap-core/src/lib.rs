//! # epochtap Core Library
//!
//! Tracks a recurring 24-hour cycle of fixed-length epochs per entity (a user
//! or a group chat), folds the entity's self-reported "tapped" epochs into a
//! reward-efficiency tier, and pushes a status update at each epoch boundary.
//!
//! ## Architecture
//!
//! - **Epoch Engine**: a wall-clock-based state machine. It keeps no time of
//!   its own; callers pass `now` and persist what it returns
//! - **Tier Table**: fixed lookup from tapped-epoch count to tier
//! - **Tracker**: per-entity serialized operations over a snapshot store and a
//!   transport
//! - **Driver**: one periodic timer per active entity
//! - **Storage**: JSON file or SQLite snapshot stores and TOML configuration
//!
//! ## Key Components
//!
//! - [`EpochEngine`]: Core cycle state machine
//! - [`Tracker`]: Entity operations (activate, status, tick, decide, adjust, reset)
//! - [`SnapshotStore`]: Record persistence collaborator
//! - [`Transport`]: Status delivery collaborator
//! - [`Config`]: Application configuration management

pub mod clock;
pub mod cycle;
pub mod driver;
pub mod error;
pub mod format;
pub mod scheduler;
pub mod storage;
pub mod tier;
pub mod tracker;
pub mod transport;

pub use clock::{Clock, FixedClock, SystemClock};
pub use cycle::{
    AdjustOutcome, Adjustment, CycleParams, Decision, EpochEngine, Evaluation, Outcome,
    RenewalPolicy, StatusReport, TrackedRecord,
};
pub use driver::Driver;
pub use error::{ConfigError, CoreError, DeliveryError, StorageError};
pub use scheduler::Scheduler;
pub use storage::{Config, JsonFileStore, MemoryStore, Snapshot, SnapshotStore, SqliteStore};
pub use tier::{tier_for, Tier, TierPlacement};
pub use tracker::{Activation, Delivery, StatusOutcome, Tracker};
pub use transport::{
    ConsoleTransport, MessageHandle, RecordingTransport, StatusMessage, Transport,
};

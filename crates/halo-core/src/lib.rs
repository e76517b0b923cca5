//! # halo-core
//!
//! Core state-derivation engine for the halo exposure notification client.
//!
//! This crate provides:
//! - Derivation of one consistent UI-state snapshot from many
//!   asynchronously-arriving signals (proximity status, sync outcomes, push
//!   permission, user overrides)
//! - Half-open interval reconciliation for the venue check-in diary
//! - Exposure-notification deduplication with a persisted ledger
//! - Configuration and persistence for the engine's own state
//!
//! The Bluetooth proximity protocol and its cryptography live in an
//! external SDK; only its tagged-variant status output is consumed here.
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`interval`] - Half-open interval arithmetic (free sub-ranges, overlap)
//! - [`diary`] - Check-in diary with the overlap conflict gate
//! - [`dedupe`] - "New since last time" exposure notification effects
//! - [`status`] - Input types delivered by external collaborators
//! - [`snapshot`] - The immutable derived UI-state snapshot
//! - [`derive`] - The pure snapshot derivation with its precedence rules
//! - [`store`] - The state container: cause setters, batching, observers
//! - [`config`] - Application configuration loading, saving, and validation
//! - [`storage`] - Persistent storage for engine state using JSON files
//! - [`error`] - Unified error types for the crate
//!
//! The engine is single-threaded by construction: all cause mutation and
//! recomputation happen on one execution context, and asynchronous
//! producers marshal their results onto it before touching the store.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod config;
pub mod dedupe;
pub mod derive;
pub mod diary;
pub mod error;
pub mod interval;
pub mod snapshot;
pub mod status;
pub mod storage;
pub mod store;

// Re-export primary types for convenience
pub use config::{AppConfig, DebugConfig, SyncConfig};
pub use dedupe::{Effect, ExposureDedupe};
pub use derive::{build_snapshot, Causes, DerivationConfig};
pub use diary::{CheckIn, CheckInEdit, ConflictResolution, Diary, EditOutcome};
pub use error::{HaloError, Result};
pub use interval::{free_subranges, Interval};
pub use snapshot::{PhoneCallState, ReportState, SyncProblem, TracingDisplay, UiSnapshot};
pub use status::{
    ExposureDay, InactiveReason, InfectionStatus, SyncError, SyncErrorHistory, TrackingStatus,
};
pub use storage::{CallRecords, Storage, SyncState};
pub use store::{RequestCoordinator, RequestTicket, StateStore, SubscriptionToken};

//! Infrastructure layer: persistence boundary, verification gateway, engine.
//!
//! The domain crates decide; this crate reads snapshots, commits the decided
//! mutations atomically and publishes what happened.

pub mod activity;
pub mod clock;
pub mod config;
pub mod engine;
pub mod store;
pub mod verification;


pub use activity::{ActivityEntry, ActivityFeed, ActivityPublisher, LedgerEvent};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{
    BatchProgress, BillCounts, BulkDeleteReport, CardDetail, CardView, CustomerDeletion,
    CustomerHistory, Dashboard, IngestOutcome, LedgerEngine, RecheckItemReport, RecheckOutcome,
    VerifyItemReport,
};
pub use store::{InMemoryLedgerStore, LedgerStore, Mutation, StoreError, Versioned};
pub use verification::{Gateway, VerificationAdapter};

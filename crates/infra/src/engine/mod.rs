//! Ledger engine: the mutation and query surface of the ledger.
//!
//! Every operation follows the same pipeline:
//!
//! ```text
//! read versioned snapshots → decide (pure domain rules) → commit batch → publish
//! ```
//!
//! Deciding never mutates anything; a batch either commits entirely or not
//! at all, and events are only published after the commit succeeded.

mod bills;
mod cards;
mod customers;
mod queries;
mod sales;

use std::sync::Arc;

use tracing::warn;

use billbook_bills::Bill;
use billbook_core::{BillId, Entity, LedgerError, LedgerResult};
use billbook_events::{EventBus, EventEnvelope};

use crate::activity::{ActivityFeed, ActivityPublisher, LedgerEvent};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::store::{LedgerStore, Mutation, StoreError, Versioned};
use crate::verification::{Gateway, VerificationAdapter};

pub use bills::{
    BatchProgress, BulkDeleteReport, IngestOutcome, RecheckItemReport, RecheckOutcome,
    VerifyItemReport,
};
pub use customers::CustomerDeletion;
pub use queries::{BillCounts, CardDetail, CardView, CustomerHistory, Dashboard};

#[derive(Debug)]
pub struct LedgerEngine<S, B> {
    store: S,
    activity: ActivityPublisher<B>,
    gateway: Option<Gateway>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl<S, B> LedgerEngine<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<LedgerEvent>>,
{
    pub fn new(store: S, bus: B, config: EngineConfig) -> Self {
        Self {
            store,
            activity: ActivityPublisher::new(bus, config.activity_capacity),
            gateway: None,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Attach the verification adapter, bounded by the configured timeout.
    pub fn with_verification(mut self, adapter: Arc<dyn VerificationAdapter>) -> Self {
        self.gateway = Some(Gateway::new(adapter, self.config.gateway_timeout));
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        self.activity.bus()
    }

    pub fn activity(&self) -> &ActivityFeed {
        self.activity.feed()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn gateway(&self) -> LedgerResult<&Gateway> {
        self.gateway
            .as_ref()
            .ok_or_else(|| LedgerError::GatewayError("no verification adapter configured".into()))
    }

    fn commit(&self, mutations: Vec<Mutation>) -> LedgerResult<()> {
        self.store.commit(mutations).map_err(LedgerError::from)
    }

    /// Versioned snapshots of every existing bill among `ids` (deduplicated).
    /// Missing ids are simply absent from the result.
    fn read_bills(&self, ids: &[BillId]) -> LedgerResult<Vec<Versioned<Bill>>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in billbook_bills::dedupe_ids(ids) {
            if let Some(bill) = self.store.bill(id)? {
                found.push(bill);
            }
        }
        Ok(found)
    }

    /// Translate a failed commit that touched `bill_ids`.
    ///
    /// A version conflict on a bill means another sale or payment won the
    /// race; the caller is told which bills are gone rather than seeing a
    /// generic conflict.
    fn commit_failure(&self, err: StoreError, bill_ids: &[BillId]) -> LedgerError {
        if !err.is_conflict_on(Bill::kind()) {
            return err.into();
        }

        let lost: Vec<BillId> = match self.read_bills(bill_ids) {
            Ok(current) => bill_ids
                .iter()
                .copied()
                .filter(|id| {
                    !current
                        .iter()
                        .any(|b| b.value.id() == *id && b.value.is_available())
                })
                .collect(),
            Err(read_err) => return read_err,
        };

        if lost.is_empty() {
            err.into()
        } else {
            warn!(bills = ?lost, "lost race for bills");
            LedgerError::bill_not_available(billbook_bills::dedupe_ids(&lost))
        }
    }
}

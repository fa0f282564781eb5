//! Bill inventory operations: ingest, recheck, selection, hold, deletion.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use billbook_bills::{
    Bill, NewBill, ProviderRegion, VerificationOutcome, normalize_code, select_available,
};
use billbook_core::{BillId, Entity, ExpectedVersion, LedgerError, LedgerResult};
use billbook_events::{EventBus, EventEnvelope};

use super::LedgerEngine;
use crate::activity::LedgerEvent;
use crate::store::{LedgerStore, Mutation, StoreError, Versioned};

/// Result of feeding one gateway answer into the inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// No live bill existed for the code; a new AVAILABLE bill was created.
    Created(Bill),
    /// The live bill for the code was refreshed in place.
    Refreshed(Bill),
    /// The gateway reported no debt; nothing was stored.
    NoDebt,
}

impl IngestOutcome {
    pub fn bill(&self) -> Option<&Bill> {
        match self {
            IngestOutcome::Created(bill) | IngestOutcome::Refreshed(bill) => Some(bill),
            IngestOutcome::NoDebt => None,
        }
    }
}

/// Result of rechecking an AVAILABLE bill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecheckOutcome {
    /// Still owed; fields refreshed, still AVAILABLE.
    StillOwed(Bill),
    /// No longer owed; the bill is now CROSSED.
    NoLongerOwed(Bill),
}

impl RecheckOutcome {
    pub fn bill(&self) -> &Bill {
        match self {
            RecheckOutcome::StillOwed(bill) | RecheckOutcome::NoLongerOwed(bill) => bill,
        }
    }

    /// Whether the operator should be offered to move the customer's
    /// business to another bill.
    pub fn should_offer_transfer(&self) -> bool {
        matches!(self, RecheckOutcome::NoLongerOwed(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkDeleteReport {
    pub deleted: Vec<BillId>,
    pub failed: Vec<(BillId, LedgerError)>,
}

/// Emitted after every finished batch item, in input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyItemReport {
    pub customer_code: String,
    pub region: ProviderRegion,
    pub result: LedgerResult<IngestOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecheckItemReport {
    pub bill_id: BillId,
    pub result: LedgerResult<RecheckOutcome>,
}

impl<S, B> LedgerEngine<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<LedgerEvent>>,
{
    /// Store a gateway answer for `customer_code` in `region`.
    ///
    /// Idempotent on the live (AVAILABLE or PENDING) bill for the code: a
    /// repeated answer refreshes it instead of creating a second one. Once
    /// the previous bill is SOLD or CROSSED a new debt becomes a new bill.
    #[instrument(skip(self, outcome), fields(owed = outcome.is_owed()))]
    pub fn ingest_verification(
        &self,
        customer_code: &str,
        region: ProviderRegion,
        outcome: VerificationOutcome,
    ) -> LedgerResult<IngestOutcome> {
        let code = normalize_code(customer_code);
        if code.is_empty() {
            return Err(LedgerError::validation("customer_code cannot be empty"));
        }

        let record = match outcome {
            VerificationOutcome::Verified(record) => record,
            VerificationOutcome::NotFound => {
                debug!(customer_code = %code, "no debt reported; nothing stored");
                return Ok(IngestOutcome::NoDebt);
            }
        };

        // A concurrent ingest of the same code may create the live bill
        // between our read and our commit; the second pass then refreshes it.
        let mut attempts = 0;
        loop {
            attempts += 1;
            let now = self.clock.now();
            let (mutation, outcome) = match self.live_bill(&code, region)? {
                Some(live) => {
                    let mut bill = live.value.clone();
                    bill.refresh(&record, now)?;
                    (
                        Mutation::PutBill {
                            bill: bill.clone(),
                            expected: live.expected_version(),
                        },
                        IngestOutcome::Refreshed(bill),
                    )
                }
                None => {
                    let bill = Bill::from_verification(BillId::new(), &code, region, &record, now)?;
                    (
                        Mutation::PutBill {
                            bill: bill.clone(),
                            expected: ExpectedVersion::absent(),
                        },
                        IngestOutcome::Created(bill),
                    )
                }
            };

            match self.store.commit(vec![mutation]) {
                Ok(()) => {
                    if let Some(bill) = outcome.bill() {
                        let created = matches!(outcome, IngestOutcome::Created(_));
                        info!(bill_id = %bill.id(), customer_code = %code, created, "bill ingested");
                        self.activity.publish(LedgerEvent::BillIngested {
                            bill_id: bill.id(),
                            customer_code: code.clone(),
                            region,
                            amount: bill.amount(),
                            created,
                            occurred_at: now,
                        });
                    }
                    return Ok(outcome);
                }
                Err(err @ (StoreError::DuplicateLiveBill { .. } | StoreError::Conflict { .. }))
                    if attempts < 2 =>
                {
                    debug!(customer_code = %code, error = %err, "ingest raced; retrying once");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Ask the gateway about `customer_code` and store the answer.
    pub async fn verify_and_ingest(
        &self,
        customer_code: &str,
        region: ProviderRegion,
    ) -> LedgerResult<IngestOutcome> {
        let code = normalize_code(customer_code);
        let outcome = self.gateway()?.verify(&code, region).await?;
        self.ingest_verification(&code, region, outcome)
    }

    /// Manual entry of a bill the gateway has not (yet) confirmed.
    #[instrument(skip(self, new), fields(customer_code = %new.customer_code))]
    pub fn create_bill(&self, new: NewBill) -> LedgerResult<Bill> {
        let now = self.clock.now();
        let bill = Bill::create(BillId::new(), new, now)?;
        if self.live_bill(bill.customer_code(), bill.provider_region())?.is_some() {
            return Err(LedgerError::conflict(format!(
                "a live bill for {} already exists",
                bill.customer_code()
            )));
        }

        self.commit(vec![Mutation::PutBill {
            bill: bill.clone(),
            expected: ExpectedVersion::absent(),
        }])?;

        info!(bill_id = %bill.id(), "bill entered manually");
        self.activity.publish(LedgerEvent::BillCreated {
            bill_id: bill.id(),
            customer_code: bill.customer_code().to_string(),
            occurred_at: now,
        });
        Ok(bill)
    }

    /// Re-verify an AVAILABLE bill.
    ///
    /// Gateway failures leave the bill untouched.
    #[instrument(skip(self))]
    pub async fn recheck(&self, bill_id: BillId) -> LedgerResult<RecheckOutcome> {
        let current = self.require_bill(bill_id)?;
        current.value.ensure_available()?;

        let gateway = self.gateway()?;
        let answer = gateway
            .verify(current.value.customer_code(), current.value.provider_region())
            .await?;

        let now = self.clock.now();
        let mut bill = current.value.clone();
        let outcome = match answer {
            VerificationOutcome::Verified(record) => {
                bill.refresh(&record, now)?;
                RecheckOutcome::StillOwed(bill.clone())
            }
            VerificationOutcome::NotFound => {
                bill.mark_crossed(now)?;
                RecheckOutcome::NoLongerOwed(bill.clone())
            }
        };

        self.store
            .commit(vec![Mutation::PutBill {
                bill: bill.clone(),
                expected: current.expected_version(),
            }])
            .map_err(|err| self.commit_failure(err, &[bill_id]))?;

        let event = match &outcome {
            RecheckOutcome::StillOwed(_) => {
                info!(%bill_id, "bill still owed");
                LedgerEvent::BillRechecked {
                    bill_id,
                    amount: bill.amount(),
                    occurred_at: now,
                }
            }
            RecheckOutcome::NoLongerOwed(_) => {
                info!(%bill_id, "bill crossed");
                LedgerEvent::BillCrossed {
                    bill_id,
                    customer_code: bill.customer_code().to_string(),
                    occurred_at: now,
                }
            }
        };
        self.activity.publish(event);
        Ok(outcome)
    }

    /// Snapshot of the requested bills, failing unless every one exists and
    /// is AVAILABLE.
    pub fn select_available(&self, bill_ids: &[BillId]) -> LedgerResult<Vec<Bill>> {
        let bills: Vec<Bill> = self
            .read_bills(bill_ids)?
            .into_iter()
            .map(|row| row.value)
            .collect();
        Ok(select_available(bill_ids, &bills)?.into_iter().cloned().collect())
    }

    /// Delete a bill. SOLD and CROSSED bills are locked.
    #[instrument(skip(self))]
    pub fn delete_bill(&self, bill_id: BillId) -> LedgerResult<()> {
        let current = self.require_bill(bill_id)?;
        current.value.ensure_deletable()?;

        self.store
            .commit(vec![Mutation::DeleteBill {
                id: bill_id,
                expected: current.expected_version(),
            }])
            .map_err(|err| self.deletion_failure(err, bill_id))?;

        info!(%bill_id, "bill deleted");
        self.activity.publish(LedgerEvent::BillDeleted {
            bill_id,
            occurred_at: self.clock.now(),
        });
        Ok(())
    }

    /// Delete each bill independently; one failure does not stop the rest.
    pub fn bulk_delete(&self, bill_ids: &[BillId]) -> BulkDeleteReport {
        let mut report = BulkDeleteReport::default();
        for id in billbook_bills::dedupe_ids(bill_ids) {
            match self.delete_bill(id) {
                Ok(()) => report.deleted.push(id),
                Err(err) => report.failed.push((id, err)),
            }
        }
        if !report.failed.is_empty() {
            warn!(
                deleted = report.deleted.len(),
                failed = report.failed.len(),
                "bulk delete partially failed"
            );
        }
        report
    }

    /// Put an AVAILABLE bill on administrative hold.
    pub fn mark_pending(&self, bill_id: BillId) -> LedgerResult<Bill> {
        self.change_hold(bill_id, Bill::mark_pending)
    }

    /// Release a held bill back to AVAILABLE.
    pub fn release_pending(&self, bill_id: BillId) -> LedgerResult<Bill> {
        self.change_hold(bill_id, Bill::release_pending)
    }

    /// Verify many codes with bounded concurrency.
    ///
    /// Each item succeeds or fails on its own. `progress` fires once per
    /// finished item, in input order.
    pub async fn verify_batch<F>(
        &self,
        items: Vec<(String, ProviderRegion)>,
        mut progress: F,
    ) -> Vec<VerifyItemReport>
    where
        F: FnMut(BatchProgress),
    {
        let total = items.len();
        let mut results = stream::iter(items.into_iter().map(|(code, region)| async move {
            let result = self.verify_and_ingest(&code, region).await;
            VerifyItemReport {
                customer_code: code,
                region,
                result,
            }
        }))
        .buffered(self.config.verification_concurrency.max(1));

        let mut reports = Vec::with_capacity(total);
        while let Some(report) = results.next().await {
            if let Err(err) = &report.result {
                warn!(customer_code = %report.customer_code, error = %err, "batch verification item failed");
            }
            reports.push(report);
            progress(BatchProgress {
                completed: reports.len(),
                total,
            });
        }
        reports
    }

    /// Recheck many bills with bounded concurrency; see [`Self::verify_batch`].
    pub async fn recheck_batch<F>(&self, bill_ids: Vec<BillId>, mut progress: F) -> Vec<RecheckItemReport>
    where
        F: FnMut(BatchProgress),
    {
        let total = bill_ids.len();
        let mut results = stream::iter(bill_ids.into_iter().map(|bill_id| async move {
            RecheckItemReport {
                bill_id,
                result: self.recheck(bill_id).await,
            }
        }))
        .buffered(self.config.verification_concurrency.max(1));

        let mut reports = Vec::with_capacity(total);
        while let Some(report) = results.next().await {
            reports.push(report);
            progress(BatchProgress {
                completed: reports.len(),
                total,
            });
        }
        reports
    }

    fn require_bill(&self, bill_id: BillId) -> LedgerResult<Versioned<Bill>> {
        self.store
            .bill(bill_id)?
            .ok_or(LedgerError::BillNotFound(bill_id))
    }

    fn live_bill(&self, code: &str, region: ProviderRegion) -> LedgerResult<Option<Versioned<Bill>>> {
        Ok(self
            .store
            .bills()?
            .into_iter()
            .find(|row| row.value.is_live_for(code, region)))
    }

    fn change_hold(
        &self,
        bill_id: BillId,
        transition: fn(&mut Bill) -> LedgerResult<()>,
    ) -> LedgerResult<Bill> {
        let current = self.require_bill(bill_id)?;
        let mut bill = current.value.clone();
        transition(&mut bill)?;

        self.store
            .commit(vec![Mutation::PutBill {
                bill: bill.clone(),
                expected: current.expected_version(),
            }])
            .map_err(|err| self.commit_failure(err, &[bill_id]))?;

        info!(%bill_id, status = %bill.status(), "bill hold changed");
        self.activity.publish(LedgerEvent::BillHoldChanged {
            bill_id,
            status: bill.status(),
            occurred_at: self.clock.now(),
        });
        Ok(bill)
    }

    /// A delete that lost a race is re-evaluated against the current bill.
    fn deletion_failure(&self, err: StoreError, bill_id: BillId) -> LedgerError {
        if !err.is_conflict_on(Bill::kind()) {
            return err.into();
        }
        match self.store.bill(bill_id) {
            Ok(None) => LedgerError::BillNotFound(bill_id),
            Ok(Some(row)) => match row.value.ensure_deletable() {
                Err(locked) => locked,
                Ok(()) => err.into(),
            },
            Err(read_err) => read_err.into(),
        }
    }
}

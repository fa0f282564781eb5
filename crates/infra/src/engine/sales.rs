use tracing::{info, instrument};

use billbook_core::{Entity, LedgerError, SaleId};
use billbook_events::{EventBus, EventEnvelope};
use billbook_sales::{Sale, SaleAborted, SaleDraft, settle_sale};

use super::LedgerEngine;
use crate::activity::LedgerEvent;
use crate::store::{LedgerStore, Mutation};

impl<S, B> LedgerEngine<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<LedgerEvent>>,
{
    /// Sell the selected bills to a customer.
    ///
    /// All of it commits or none of it: every selected bill becomes SOLD, the
    /// sale is recorded and the customer's totals grow by the sale. When
    /// another operation wins the race for a selected bill the sale aborts
    /// with the bills that were lost.
    #[instrument(skip(self, draft), fields(customer_id = %draft.customer_id, bills = draft.bill_ids.len()))]
    pub fn create_sale(&self, draft: &SaleDraft) -> Result<Sale, SaleAborted> {
        if draft.bill_ids.is_empty() {
            return Err(LedgerError::EmptySelection.into());
        }

        let customer = self
            .store
            .customer(draft.customer_id)
            .map_err(LedgerError::from)?
            .ok_or(LedgerError::CustomerNotFound(draft.customer_id))?;

        let rows = self.read_bills(&draft.bill_ids)?;
        let snapshot: Vec<_> = rows.iter().map(|row| row.value.clone()).collect();

        let now = self.clock.now();
        let settlement = settle_sale(SaleId::new(), draft, &customer.value, &snapshot, now)?;
        let sale = settlement.sale;

        let mut mutations = Vec::with_capacity(settlement.sold_bills.len() + 2);
        for bill in settlement.sold_bills {
            let expected = rows
                .iter()
                .find(|row| row.value.id() == bill.id())
                .map(|row| row.expected_version())
                .ok_or_else(|| LedgerError::bill_not_available([bill.id()]))?;
            mutations.push(Mutation::PutBill { bill, expected });
        }
        mutations.push(Mutation::RecordCustomerActivity {
            id: sale.customer_id(),
            value: sale.total(),
            profit: sale.profit_value(),
            require_active: true,
        });
        mutations.push(Mutation::PutSale(sale.clone()));

        self.store
            .commit(mutations)
            .map_err(|err| self.commit_failure(err, sale.bill_ids()))?;

        info!(
            sale_id = %sale.id(),
            total = %sale.total(),
            profit = %sale.profit_value(),
            "sale created"
        );
        self.activity.publish(LedgerEvent::SaleCreated {
            sale_id: sale.id(),
            customer_id: sale.customer_id(),
            bill_ids: sale.bill_ids().to_vec(),
            total: sale.total(),
            profit_value: sale.profit_value(),
            occurred_at: now,
        });
        Ok(sale)
    }
}

#[cfg(test)]
mod tests {
    use billbook_bills::{BillStatus, ProviderRegion, VerificationOutcome, VerifiedRecord};
    use billbook_core::{BillId, CustomerId, Money};
    use billbook_customers::CustomerUpdate;
    use billbook_sales::SalePaymentMethod;

    use super::*;
    use crate::engine::test_support::{TestEngine, customer, engine};

    fn owed(engine: &TestEngine, code: &str, amount: i64) -> BillId {
        engine
            .ingest_verification(
                code,
                ProviderRegion::North,
                VerificationOutcome::Verified(VerifiedRecord {
                    amount: Money::new(amount),
                    full_name: "TRAN B".to_string(),
                    address: String::new(),
                    billing_cycle: "04/2025".to_string(),
                }),
            )
            .unwrap()
            .bill()
            .unwrap()
            .id()
    }

    fn draft(customer_id: CustomerId, bill_ids: Vec<BillId>, pct: f64) -> SaleDraft {
        SaleDraft {
            customer_id,
            bill_ids,
            profit_pct: pct,
            payment_method: SalePaymentMethod::Cash,
            notes: None,
        }
    }

    #[test]
    fn sale_marks_bills_sold_and_updates_customer() {
        let engine = engine();
        let buyer = customer(&engine, "Le C");
        let a = owed(&engine, "PA01", 500_000);
        let b = owed(&engine, "PA02", 250_000);

        let sale = engine.create_sale(&draft(buyer.id(), vec![a, b], 10.0)).unwrap();
        assert_eq!(sale.total(), Money::new(750_000));
        assert_eq!(sale.profit_value(), Money::new(75_000));
        assert_eq!(sale.payback(), Money::new(675_000));

        for id in [a, b] {
            let bill = engine.store().bill(id).unwrap().unwrap().value;
            assert_eq!(bill.status(), BillStatus::Sold);
        }
        let stats = engine.store().customer(buyer.id()).unwrap().unwrap().value;
        assert_eq!(stats.stats().total_transactions, 1);
        assert_eq!(stats.stats().total_value, Money::new(750_000));
        assert_eq!(stats.stats().total_profit_generated, Money::new(75_000));
        assert_eq!(engine.store().sales().unwrap().len(), 1);
    }

    #[test]
    fn empty_selection_touches_nothing() {
        let engine = engine();
        let buyer = customer(&engine, "Le C");

        let err = engine.create_sale(&draft(buyer.id(), vec![], 10.0)).unwrap_err();
        assert_eq!(err.reason(), &LedgerError::EmptySelection);
        assert!(engine.store().sales().unwrap().is_empty());
        assert!(engine.activity().recent(10).iter().all(|e| e.event_type != "sales.sale.created"));
    }

    #[test]
    fn unknown_customer_aborts() {
        let engine = engine();
        let bill = owed(&engine, "PA01", 100);
        let ghost = CustomerId::new();

        let err = engine.create_sale(&draft(ghost, vec![bill], 5.0)).unwrap_err();
        assert_eq!(err.into_reason(), LedgerError::CustomerNotFound(ghost));
    }

    #[test]
    fn inactive_customer_aborts_without_side_effects() {
        let engine = engine();
        let buyer = customer(&engine, "Le C");
        engine
            .update_customer(
                buyer.id(),
                CustomerUpdate {
                    is_active: Some(false),
                    ..CustomerUpdate::default()
                },
            )
            .unwrap();
        let bill = owed(&engine, "PA01", 100);

        let err = engine.create_sale(&draft(buyer.id(), vec![bill], 5.0)).unwrap_err();
        assert_eq!(err.reason(), &LedgerError::CustomerInactive(buyer.id()));
        assert_eq!(
            engine.store().bill(bill).unwrap().unwrap().value.status(),
            BillStatus::Available
        );
    }

    #[test]
    fn bill_sold_in_between_is_reported() {
        let engine = engine();
        let buyer = customer(&engine, "Le C");
        let a = owed(&engine, "PA01", 100);
        let b = owed(&engine, "PA02", 200);

        engine.create_sale(&draft(buyer.id(), vec![b], 5.0)).unwrap();
        let err = engine.create_sale(&draft(buyer.id(), vec![a, b], 5.0)).unwrap_err();
        assert_eq!(err.into_reason(), LedgerError::bill_not_available([b]));
        assert_eq!(
            engine.store().bill(a).unwrap().unwrap().value.status(),
            BillStatus::Available
        );
    }
}

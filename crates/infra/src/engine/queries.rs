//! Read side: listings, per-customer history, card views and the dashboard.
//!
//! Card status is re-derived from the clock on every read; the stored
//! snapshot is never trusted here.

use serde::Serialize;
use tracing::debug;

use billbook_bills::{Bill, BillFilter, BillStatus};
use billbook_cards::{BillingCycle, CardPayment, CardStatus, CreditCard};
use billbook_core::{CardId, CustomerId, Entity, LedgerResult, Money};
use billbook_customers::{Customer, CustomerFilter};
use billbook_events::{EventBus, EventEnvelope};
use billbook_sales::Sale;

use super::LedgerEngine;
use crate::activity::{ActivityEntry, LedgerEvent};
use crate::store::LedgerStore;

/// A card with its status as of today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardView {
    pub card: CreditCard,
    pub status: CardStatus,
    pub cycle: BillingCycle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardDetail {
    pub card: CreditCard,
    pub status: CardStatus,
    pub cycle: BillingCycle,
    /// Newest first, bounded by `recent_payments_limit`.
    pub recent_payments: Vec<CardPayment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerHistory {
    pub customer: Customer,
    pub sales: Vec<Sale>,
    pub cards: Vec<CardView>,
    pub payments: Vec<CardPayment>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BillCounts {
    pub available: usize,
    pub pending: usize,
    pub sold: usize,
    pub crossed: usize,
}

impl BillCounts {
    pub fn total(&self) -> usize {
        self.available + self.pending + self.sold + self.crossed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub bills: BillCounts,
    /// Sum of verified amounts of AVAILABLE bills.
    pub available_value: Money,
    pub sold_value: Money,
    pub customers_total: usize,
    pub customers_active: usize,
    pub sales_count: usize,
    pub sales_total: Money,
    pub sales_profit: Money,
    pub payments_count: usize,
    pub payments_total: Money,
    pub payments_profit: Money,
    pub cards_needing_cycling: usize,
    pub cards_overdue: usize,
    pub recent_activity: Vec<ActivityEntry>,
}

const DASHBOARD_ACTIVITY: usize = 10;

impl<S, B> LedgerEngine<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<LedgerEvent>>,
{
    /// Bills matching `filter`, newest first.
    pub fn list_bills(&self, filter: &BillFilter) -> LedgerResult<Vec<Bill>> {
        let mut bills: Vec<Bill> = self
            .store
            .bills()?
            .into_iter()
            .map(|row| row.value)
            .filter(|bill| filter.matches(bill))
            .collect();
        bills.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        debug!(count = bills.len(), "listed bills");
        Ok(bills)
    }

    /// Customers matching `filter`, by name.
    pub fn list_customers(&self, filter: &CustomerFilter) -> LedgerResult<Vec<Customer>> {
        let mut customers: Vec<Customer> = self
            .store
            .customers()?
            .into_iter()
            .map(|row| row.value)
            .filter(|customer| filter.matches(customer))
            .collect();
        customers.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(customers)
    }

    pub fn customer_history(&self, customer_id: CustomerId) -> LedgerResult<CustomerHistory> {
        let customer = self.require_customer(customer_id)?.value;

        let mut sales: Vec<Sale> = self
            .store
            .sales()?
            .into_iter()
            .filter(|sale| sale.customer_id() == customer_id)
            .collect();
        sales.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

        let all_payments = self.store.payments()?;
        let mut cards = Vec::new();
        let mut payments = Vec::new();
        for row in self.store.cards()? {
            let card = row.value;
            if card.customer_id() != customer_id {
                continue;
            }
            let own: Vec<CardPayment> = all_payments
                .iter()
                .filter(|p| p.card_id() == card.id())
                .cloned()
                .collect();
            let (status, cycle) = self.card_status(&card, &own)?;
            payments.extend(own);
            cards.push(CardView { card, status, cycle });
        }
        payments.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        cards.sort_by(|a, b| a.card.created_at().cmp(&b.card.created_at()));

        Ok(CustomerHistory {
            customer,
            sales,
            cards,
            payments,
        })
    }

    /// Every card with its status as of today.
    pub fn list_cards(&self) -> LedgerResult<Vec<CardView>> {
        let payments = self.store.payments()?;
        let mut views = Vec::new();
        for row in self.store.cards()? {
            let card = row.value;
            let own: Vec<CardPayment> = payments
                .iter()
                .filter(|p| p.card_id() == card.id())
                .cloned()
                .collect();
            let (status, cycle) = self.card_status(&card, &own)?;
            views.push(CardView { card, status, cycle });
        }
        views.sort_by(|a, b| a.card.created_at().cmp(&b.card.created_at()));
        Ok(views)
    }

    pub fn card_detail(&self, card_id: CardId) -> LedgerResult<CardDetail> {
        let card = self.require_card(card_id)?.value;
        let mut payments = self.card_payments(card_id)?;
        let (status, cycle) = self.card_status(&card, &payments)?;
        payments.truncate(self.config.recent_payments_limit);

        Ok(CardDetail {
            card,
            status,
            cycle,
            recent_payments: payments,
        })
    }

    pub fn dashboard(&self) -> LedgerResult<Dashboard> {
        let mut counts = BillCounts::default();
        let mut available = Vec::new();
        let mut sold = Vec::new();
        for row in self.store.bills()? {
            let bill = row.value;
            match bill.status() {
                BillStatus::Available => {
                    counts.available += 1;
                    available.extend(bill.amount());
                }
                BillStatus::Pending => counts.pending += 1,
                BillStatus::Sold => {
                    counts.sold += 1;
                    sold.extend(bill.amount());
                }
                BillStatus::Crossed => counts.crossed += 1,
            }
        }

        let customers = self.store.customers()?;
        let sales = self.store.sales()?;
        let payments = self.store.payments()?;

        let mut cards_needing_cycling = 0;
        let mut cards_overdue = 0;
        for view in self.list_cards()? {
            match view.status {
                CardStatus::NeedsCycling => cards_needing_cycling += 1,
                CardStatus::Overdue => cards_overdue += 1,
                CardStatus::NotDue | CardStatus::Cycled => {}
            }
        }

        Ok(Dashboard {
            bills: counts,
            available_value: Money::checked_sum(available)?,
            sold_value: Money::checked_sum(sold)?,
            customers_total: customers.len(),
            customers_active: customers.iter().filter(|c| c.value.is_active()).count(),
            sales_count: sales.len(),
            sales_total: Money::checked_sum(sales.iter().map(Sale::total))?,
            sales_profit: Money::checked_sum(sales.iter().map(Sale::profit_value))?,
            payments_count: payments.len(),
            payments_total: Money::checked_sum(payments.iter().map(CardPayment::total_amount))?,
            payments_profit: Money::checked_sum(payments.iter().map(CardPayment::profit_value))?,
            cards_needing_cycling,
            cards_overdue,
            recent_activity: self.activity().recent(DASHBOARD_ACTIVITY),
        })
    }
}

#[cfg(test)]
mod tests {
    use billbook_bills::{NewBill, ProviderRegion};
    use billbook_cards::{NewCard, PaymentDraft, PaymentSource};
    use billbook_core::BillId;
    use billbook_customers::CustomerType;
    use billbook_sales::{SaleDraft, SalePaymentMethod};

    use super::*;
    use crate::engine::test_support::{TestEngine, customer, day, engine, engine_on};

    fn bill(engine: &TestEngine, code: &str, name: &str, amount: Option<i64>) -> Bill {
        engine
            .create_bill(NewBill {
                customer_code: code.to_string(),
                provider_region: ProviderRegion::Hcmc,
                full_name: name.to_string(),
                address: "Quan 1".to_string(),
                amount: amount.map(Money::new),
                billing_cycle: "04/2025".to_string(),
                note: None,
            })
            .unwrap()
    }

    fn card(engine: &TestEngine, customer_id: CustomerId) -> CreditCard {
        engine
            .create_card(NewCard {
                customer_id,
                card_number: "5500000000000004".to_string(),
                cardholder_name: "TRAN B".to_string(),
                bank_name: "TCB".to_string(),
                card_type: "MASTER".to_string(),
                expiry_date: "01/29".to_string(),
                ccv: "999".to_string(),
                statement_day: 1,
                payment_due_day: 15,
                credit_limit: Money::new(20_000_000),
                notes: None,
            })
            .unwrap()
    }

    fn pos(card_id: CardId, amount: i64) -> PaymentDraft {
        PaymentDraft {
            card_id,
            profit_pct: Some(1.5),
            source: PaymentSource::Pos {
                amount: Money::new(amount),
            },
            notes: None,
        }
    }

    #[test]
    fn bill_listing_filters_and_sorts_newest_first() {
        let (engine, clock) = engine_on(day(2025, 4, 20));
        let first = bill(&engine, "PE01", "Nguyen Thi Lan", Some(100));
        clock.advance(chrono::Duration::minutes(1));
        let second = bill(&engine, "PE02", "Le Van Hung", Some(200));
        engine.mark_pending(first.id()).unwrap();

        let all = engine.list_bills(&BillFilter::default()).unwrap();
        assert_eq!(all.iter().map(|b| b.id()).collect::<Vec<BillId>>(), vec![second.id(), first.id()]);

        let pending = engine
            .list_bills(&BillFilter::default().with_status(BillStatus::Pending))
            .unwrap();
        assert_eq!(pending.len(), 1);

        let by_name = engine
            .list_bills(&BillFilter::default().with_search("hung"))
            .unwrap();
        assert_eq!(by_name[0].id(), second.id());
    }

    #[test]
    fn customer_listing_respects_activity_filter() {
        let engine = engine();
        let a = customer(&engine, "Binh");
        customer(&engine, "An");
        engine
            .update_customer(
                a.id(),
                billbook_customers::CustomerUpdate {
                    is_active: Some(false),
                    kind: Some(CustomerType::Agent),
                    ..Default::default()
                },
            )
            .unwrap();

        let active = engine
            .list_customers(&CustomerFilter {
                active: Some(true),
                ..CustomerFilter::default()
            })
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name(), "An");
        assert_eq!(engine.list_customers(&CustomerFilter::default()).unwrap().len(), 2);
    }

    #[test]
    fn history_gathers_sales_cards_and_payments() {
        let engine = engine();
        let buyer = customer(&engine, "Thu");
        let other = customer(&engine, "Other");
        let b = bill(&engine, "PE01", "X", Some(400_000));
        engine
            .create_sale(&SaleDraft {
                customer_id: buyer.id(),
                bill_ids: vec![b.id()],
                profit_pct: 2.0,
                payment_method: SalePaymentMethod::BankTransfer,
                notes: None,
            })
            .unwrap();
        let c = card(&engine, buyer.id());
        card(&engine, other.id());
        engine.create_payment(&pos(c.id(), 1_000_000)).unwrap();

        let history = engine.customer_history(buyer.id()).unwrap();
        assert_eq!(history.sales.len(), 1);
        assert_eq!(history.cards.len(), 1);
        assert_eq!(history.cards[0].status, CardStatus::Cycled);
        assert_eq!(history.payments.len(), 1);
        assert_eq!(history.customer.stats().total_transactions, 2);
    }

    #[test]
    fn card_detail_limits_recent_payments() {
        let (engine, clock) = engine_on(day(2025, 4, 20));
        let owner = customer(&engine, "Thu");
        let c = card(&engine, owner.id());
        assert_eq!(engine.card_detail(c.id()).unwrap().status, CardStatus::Overdue);

        for _ in 0..12 {
            clock.advance(chrono::Duration::minutes(5));
            engine.create_payment(&pos(c.id(), 100_000)).unwrap();
        }
        let detail = engine.card_detail(c.id()).unwrap();
        assert_eq!(detail.status, CardStatus::Cycled);
        assert_eq!(detail.recent_payments.len(), engine.config().recent_payments_limit);
        assert!(detail.recent_payments[0].created_at() > detail.recent_payments[1].created_at());
    }

    #[test]
    fn dashboard_aggregates_everything() {
        let engine = engine();
        let buyer = customer(&engine, "Thu");
        let sold = bill(&engine, "PE01", "A", Some(500_000));
        bill(&engine, "PE02", "B", Some(120_000));
        let held = bill(&engine, "PE03", "C", None);
        engine.mark_pending(held.id()).unwrap();
        engine
            .create_sale(&SaleDraft {
                customer_id: buyer.id(),
                bill_ids: vec![sold.id()],
                profit_pct: 10.0,
                payment_method: SalePaymentMethod::Cash,
                notes: None,
            })
            .unwrap();
        card(&engine, buyer.id());

        let dashboard = engine.dashboard().unwrap();
        assert_eq!(
            dashboard.bills,
            BillCounts {
                available: 1,
                pending: 1,
                sold: 1,
                crossed: 0
            }
        );
        assert_eq!(dashboard.bills.total(), 3);
        assert_eq!(dashboard.available_value, Money::new(120_000));
        assert_eq!(dashboard.sold_value, Money::new(500_000));
        assert_eq!(dashboard.customers_total, 1);
        assert_eq!(dashboard.sales_total, Money::new(500_000));
        assert_eq!(dashboard.sales_profit, Money::new(50_000));
        assert_eq!(dashboard.payments_count, 0);
        assert_eq!(dashboard.cards_overdue, 1);
        assert_eq!(dashboard.recent_activity[0].event_type, "cards.card.created");
    }
}

use std::sync::RwLock;

use billbook_bills::Bill;
use billbook_cards::{CardPayment, CreditCard};
use billbook_core::{BillId, CardId, CardPaymentId, CustomerId, Entity, ExpectedVersion, SaleId};
use billbook_customers::Customer;
use billbook_sales::Sale;

use super::table::Table;
use super::{LedgerStore, Mutation, StoreError, Versioned};

#[derive(Debug, Default)]
struct Tables {
    bills: Table<Bill>,
    customers: Table<Customer>,
    cards: Table<CreditCard>,
    sales: Table<Sale>,
    payments: Table<CardPayment>,
}

/// Prior state of the one row a mutation touches.
enum Undo {
    Bill(BillId, Option<Versioned<Bill>>),
    Customer(CustomerId, Option<Versioned<Customer>>),
    Card(CardId, Option<Versioned<CreditCard>>),
    Sale(SaleId, Option<Versioned<Sale>>),
    Payment(CardPaymentId, Option<Versioned<CardPayment>>),
}

impl Tables {
    fn undo_for(&self, mutation: &Mutation) -> Undo {
        match mutation {
            Mutation::PutBill { bill, .. } => Undo::Bill(bill.id(), self.bills.get(&bill.id())),
            Mutation::DeleteBill { id, .. } => Undo::Bill(*id, self.bills.get(id)),
            Mutation::PutCustomer { customer, .. } => {
                Undo::Customer(customer.id(), self.customers.get(&customer.id()))
            }
            Mutation::DeleteCustomer { id, .. } | Mutation::RecordCustomerActivity { id, .. } => {
                Undo::Customer(*id, self.customers.get(id))
            }
            Mutation::PutCard { card, .. } => Undo::Card(card.id(), self.cards.get(&card.id())),
            Mutation::DeleteCard { id, .. } | Mutation::SetCardStatus { id, .. } => {
                Undo::Card(*id, self.cards.get(id))
            }
            Mutation::PutSale(sale) => Undo::Sale(sale.id(), self.sales.get(&sale.id())),
            Mutation::DeleteSale(id) => Undo::Sale(*id, self.sales.get(id)),
            Mutation::PutPayment(payment) => {
                Undo::Payment(payment.id(), self.payments.get(&payment.id()))
            }
            Mutation::DeletePayment(id) => Undo::Payment(*id, self.payments.get(id)),
        }
    }

    fn revert(&mut self, undo: Undo) {
        match undo {
            Undo::Bill(id, row) => self.bills.restore(id, row),
            Undo::Customer(id, row) => self.customers.restore(id, row),
            Undo::Card(id, row) => self.cards.restore(id, row),
            Undo::Sale(id, row) => self.sales.restore(id, row),
            Undo::Payment(id, row) => self.payments.restore(id, row),
        }
    }

    /// Apply every mutation or none. Only the rows the batch touches are
    /// journaled; on failure they are restored newest first.
    fn apply_all(&mut self, mutations: Vec<Mutation>) -> Result<(), StoreError> {
        let mut journal = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            journal.push(self.undo_for(&mutation));
            if let Err(err) = self.apply(mutation) {
                for undo in journal.into_iter().rev() {
                    self.revert(undo);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn apply(&mut self, mutation: Mutation) -> Result<(), StoreError> {
        match mutation {
            Mutation::PutBill { bill, expected } => {
                self.ensure_single_live_bill(&bill)?;
                self.bills.put(bill, expected)
            }
            Mutation::DeleteBill { id, expected } => self.bills.remove(&id, expected).map(drop),
            Mutation::PutCustomer { customer, expected } => self.customers.put(customer, expected),
            Mutation::DeleteCustomer { id, expected } => {
                self.customers.remove(&id, expected).map(drop)
            }
            Mutation::RecordCustomerActivity {
                id,
                value,
                profit,
                require_active,
            } => self.customers.update(&id, |customer| {
                if require_active {
                    customer.ensure_can_transact()?;
                }
                customer.record_transaction(value, profit)?;
                Ok(())
            }),
            Mutation::PutCard { card, expected } => {
                self.customers.require(&card.customer_id())?;
                self.cards.put(card, expected)
            }
            Mutation::DeleteCard { id, expected } => self.cards.remove(&id, expected).map(drop),
            Mutation::SetCardStatus { id, status } => self.cards.update(&id, |card| {
                card.set_status_snapshot(status);
                Ok(())
            }),
            Mutation::PutSale(sale) => {
                self.customers.require(&sale.customer_id())?;
                self.sales.put(sale, ExpectedVersion::absent())
            }
            Mutation::DeleteSale(id) => self.sales.remove(&id, ExpectedVersion::Any).map(drop),
            Mutation::PutPayment(payment) => {
                self.cards.require(&payment.card_id())?;
                self.payments.put(payment, ExpectedVersion::absent())
            }
            Mutation::DeletePayment(id) => {
                self.payments.remove(&id, ExpectedVersion::Any).map(drop)
            }
        }
    }

    /// At most one AVAILABLE/PENDING bill per customer code and region.
    fn ensure_single_live_bill(&self, bill: &Bill) -> Result<(), StoreError> {
        if bill.status().is_terminal() {
            return Ok(());
        }
        let clash = self.bills.values().any(|other| {
            other.id() != bill.id()
                && other.is_live_for(bill.customer_code(), bill.provider_region())
        });
        if clash {
            return Err(StoreError::DuplicateLiveBill {
                customer_code: bill.customer_code().to_string(),
            });
        }
        Ok(())
    }
}

/// In-memory ledger store for tests/dev.
///
/// A commit holds the write lock for its whole batch and rolls back the rows
/// it touched when any mutation fails, so readers never observe half a batch.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<Tables>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> Result<R, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(f(&tables))
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("store lock poisoned".to_string())
}

impl LedgerStore for InMemoryLedgerStore {
    fn bill(&self, id: BillId) -> Result<Option<Versioned<Bill>>, StoreError> {
        self.read(|t| t.bills.get(&id))
    }

    fn bills(&self) -> Result<Vec<Versioned<Bill>>, StoreError> {
        self.read(|t| t.bills.list())
    }

    fn customer(&self, id: CustomerId) -> Result<Option<Versioned<Customer>>, StoreError> {
        self.read(|t| t.customers.get(&id))
    }

    fn customers(&self) -> Result<Vec<Versioned<Customer>>, StoreError> {
        self.read(|t| t.customers.list())
    }

    fn card(&self, id: CardId) -> Result<Option<Versioned<CreditCard>>, StoreError> {
        self.read(|t| t.cards.get(&id))
    }

    fn cards(&self) -> Result<Vec<Versioned<CreditCard>>, StoreError> {
        self.read(|t| t.cards.list())
    }

    fn sale(&self, id: SaleId) -> Result<Option<Sale>, StoreError> {
        self.read(|t| t.sales.get(&id).map(|row| row.value))
    }

    fn sales(&self) -> Result<Vec<Sale>, StoreError> {
        self.read(|t| t.sales.values().cloned().collect())
    }

    fn payment(&self, id: CardPaymentId) -> Result<Option<CardPayment>, StoreError> {
        self.read(|t| t.payments.get(&id).map(|row| row.value))
    }

    fn payments(&self) -> Result<Vec<CardPayment>, StoreError> {
        self.read(|t| t.payments.values().cloned().collect())
    }

    fn commit(&self, mutations: Vec<Mutation>) -> Result<(), StoreError> {
        if mutations.is_empty() {
            return Ok(());
        }

        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        tables.apply_all(mutations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billbook_bills::{BillStatus, ProviderRegion, VerifiedRecord};
    use billbook_core::{LedgerError, Money};
    use billbook_customers::{ContactInfo, CustomerType, CustomerUpdate, NewCustomer};
    use chrono::Utc;

    fn test_bill(code: &str) -> Bill {
        Bill::from_verification(
            BillId::new(),
            code,
            ProviderRegion::North,
            &VerifiedRecord {
                amount: Money::new(120_000),
                full_name: "DO VAN F".to_string(),
                address: "Hai Phong".to_string(),
                billing_cycle: "06/2025".to_string(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn test_customer() -> Customer {
        Customer::register(
            CustomerId::new(),
            NewCustomer {
                name: "Khach le".to_string(),
                kind: CustomerType::Individual,
                contact: ContactInfo::default(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn put_bill(bill: &Bill, expected: ExpectedVersion) -> Mutation {
        Mutation::PutBill {
            bill: bill.clone(),
            expected,
        }
    }

    #[test]
    fn versions_start_at_one_and_increase() {
        let store = InMemoryLedgerStore::new();
        let mut bill = test_bill("PA01");
        store.commit(vec![put_bill(&bill, ExpectedVersion::absent())]).unwrap();
        assert_eq!(store.bill(bill.id()).unwrap().unwrap().version, 1);

        bill.mark_pending().unwrap();
        store.commit(vec![put_bill(&bill, ExpectedVersion::Exact(1))]).unwrap();
        let stored = store.bill(bill.id()).unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.value.status(), BillStatus::Pending);
    }

    #[test]
    fn stale_write_is_a_conflict() {
        let store = InMemoryLedgerStore::new();
        let bill = test_bill("PA01");
        store.commit(vec![put_bill(&bill, ExpectedVersion::absent())]).unwrap();

        let err = store
            .commit(vec![put_bill(&bill, ExpectedVersion::absent())])
            .unwrap_err();
        assert!(err.is_conflict_on("bill"));
        assert!(matches!(LedgerError::from(err), LedgerError::Conflict(_)));
    }

    #[test]
    fn failed_batch_applies_nothing() {
        let store = InMemoryLedgerStore::new();
        let first = test_bill("PA01");
        let second = test_bill("PA02");
        store.commit(vec![put_bill(&second, ExpectedVersion::absent())]).unwrap();

        let err = store
            .commit(vec![
                put_bill(&first, ExpectedVersion::absent()),
                put_bill(&second, ExpectedVersion::Exact(7)),
            ])
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert!(store.bill(first.id()).unwrap().is_none());
    }

    #[test]
    fn failed_batch_restores_updated_and_deleted_rows() {
        let store = InMemoryLedgerStore::new();
        let customer = test_customer();
        let kept = test_bill("PA01");
        let stale = test_bill("PA02");
        store
            .commit(vec![
                Mutation::PutCustomer {
                    customer: customer.clone(),
                    expected: ExpectedVersion::absent(),
                },
                put_bill(&kept, ExpectedVersion::absent()),
                put_bill(&stale, ExpectedVersion::absent()),
            ])
            .unwrap();

        let fresh = test_bill("PA03");
        let activity = Mutation::RecordCustomerActivity {
            id: customer.id(),
            value: Money::new(5_000),
            profit: Money::new(500),
            require_active: true,
        };
        let err = store
            .commit(vec![
                activity.clone(),
                activity,
                Mutation::DeleteBill {
                    id: kept.id(),
                    expected: ExpectedVersion::Exact(1),
                },
                put_bill(&fresh, ExpectedVersion::absent()),
                put_bill(&stale, ExpectedVersion::Exact(4)),
            ])
            .unwrap_err();
        assert!(err.is_conflict_on("bill"));

        let stored = store.customer(customer.id()).unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.value.stats().total_transactions, 0);
        assert_eq!(store.bill(kept.id()).unwrap().unwrap().version, 1);
        assert!(store.bill(fresh.id()).unwrap().is_none());
        assert_eq!(store.bills().unwrap().len(), 2);
    }

    #[test]
    fn only_one_live_bill_per_code_and_region() {
        let store = InMemoryLedgerStore::new();
        let mut original = test_bill("PA01");
        store.commit(vec![put_bill(&original, ExpectedVersion::absent())]).unwrap();

        let duplicate = test_bill(" pa01 ");
        let err = store
            .commit(vec![put_bill(&duplicate, ExpectedVersion::absent())])
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateLiveBill { .. }));

        // Once the original is terminal a new live bill is accepted.
        original.mark_sold().unwrap();
        store.commit(vec![put_bill(&original, ExpectedVersion::Exact(1))]).unwrap();
        store.commit(vec![put_bill(&duplicate, ExpectedVersion::absent())]).unwrap();
    }

    #[test]
    fn activity_is_recorded_without_version_check() {
        let store = InMemoryLedgerStore::new();
        let customer = test_customer();
        store
            .commit(vec![Mutation::PutCustomer {
                customer: customer.clone(),
                expected: ExpectedVersion::absent(),
            }])
            .unwrap();

        for _ in 0..2 {
            store
                .commit(vec![Mutation::RecordCustomerActivity {
                    id: customer.id(),
                    value: Money::new(1_000),
                    profit: Money::new(10),
                    require_active: true,
                }])
                .unwrap();
        }

        let stored = store.customer(customer.id()).unwrap().unwrap();
        assert_eq!(stored.version, 3);
        assert_eq!(stored.value.stats().total_transactions, 2);
        assert_eq!(stored.value.stats().total_value, Money::new(2_000));
    }

    #[test]
    fn activity_for_deactivated_customer_rejects_the_batch() {
        let store = InMemoryLedgerStore::new();
        let mut customer = test_customer();
        store
            .commit(vec![Mutation::PutCustomer {
                customer: customer.clone(),
                expected: ExpectedVersion::absent(),
            }])
            .unwrap();

        // Deactivated after a sale read the customer but before it committed.
        customer
            .apply_update(CustomerUpdate {
                is_active: Some(false),
                ..CustomerUpdate::default()
            })
            .unwrap();
        store
            .commit(vec![Mutation::PutCustomer {
                customer: customer.clone(),
                expected: ExpectedVersion::Exact(1),
            }])
            .unwrap();

        let bill = test_bill("PA01");
        let activity = |require_active| Mutation::RecordCustomerActivity {
            id: customer.id(),
            value: Money::new(120_000),
            profit: Money::new(12_000),
            require_active,
        };
        let err = store
            .commit(vec![put_bill(&bill, ExpectedVersion::absent()), activity(true)])
            .unwrap_err();
        assert_eq!(
            LedgerError::from(err),
            LedgerError::CustomerInactive(customer.id())
        );
        assert!(store.bill(bill.id()).unwrap().is_none());
        let stored = store.customer(customer.id()).unwrap().unwrap();
        assert_eq!(stored.value.stats().total_transactions, 0);

        // Card payments still count toward an inactive owner's totals.
        store.commit(vec![activity(false)]).unwrap();
        let stored = store.customer(customer.id()).unwrap().unwrap();
        assert_eq!(stored.value.stats().total_transactions, 1);
    }

    #[test]
    fn activity_for_unknown_customer_is_missing() {
        let store = InMemoryLedgerStore::new();
        let err = store
            .commit(vec![Mutation::RecordCustomerActivity {
                id: CustomerId::new(),
                value: Money::ZERO,
                profit: Money::ZERO,
                require_active: false,
            }])
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing { entity: "customer", .. }));
    }
}

//! Persistence boundary.
//!
//! Reads return snapshots tagged with a version; writes are a batch of
//! [`Mutation`]s committed all-or-nothing. Every versioned mutation carries
//! the [`ExpectedVersion`] it was decided against, which is what serialises
//! two sales racing for the same bill.

mod in_memory;
mod table;

use std::sync::Arc;

use thiserror::Error;

use billbook_bills::Bill;
use billbook_cards::{CardPayment, CardStatus, CreditCard};
use billbook_core::{
    BillId, CardId, CardPaymentId, CustomerId, ExpectedVersion, LedgerError, Money, SaleId,
};
use billbook_customers::Customer;
use billbook_sales::Sale;

pub use in_memory::InMemoryLedgerStore;

/// A stored record and the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn expected_version(&self) -> ExpectedVersion {
        ExpectedVersion::Exact(self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A versioned write was decided against a stale snapshot.
    #[error("{entity} {id} changed concurrently (expected {expected:?}, actual {actual})")]
    Conflict {
        entity: &'static str,
        id: String,
        expected: ExpectedVersion,
        actual: u64,
    },

    /// A mutation referenced a record that does not exist.
    #[error("{entity} {id} does not exist")]
    Missing { entity: &'static str, id: String },

    /// A second live bill for the same customer code and region.
    #[error("a live bill for {customer_code} already exists")]
    DuplicateLiveBill { customer_code: String },

    /// A mutation was refused by a domain rule while being applied.
    #[error(transparent)]
    Rejected(#[from] LedgerError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_conflict_on(&self, entity: &str) -> bool {
        matches!(self, StoreError::Conflict { entity: e, .. } | StoreError::Missing { entity: e, .. } if *e == entity)
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Rejected(err) => err,
            StoreError::Unavailable(msg) => LedgerError::Storage(msg),
            other => LedgerError::conflict(other.to_string()),
        }
    }
}

/// One write in an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    PutBill { bill: Bill, expected: ExpectedVersion },
    DeleteBill { id: BillId, expected: ExpectedVersion },
    PutCustomer { customer: Customer, expected: ExpectedVersion },
    DeleteCustomer { id: CustomerId, expected: ExpectedVersion },
    /// Add one transaction to a customer's running totals. Commutative, so
    /// it is applied to whatever version is current. With `require_active`
    /// the batch fails if the customer has been deactivated meanwhile.
    RecordCustomerActivity {
        id: CustomerId,
        value: Money,
        profit: Money,
        require_active: bool,
    },
    PutCard { card: CreditCard, expected: ExpectedVersion },
    DeleteCard { id: CardId, expected: ExpectedVersion },
    /// Overwrite the card's status snapshot without a version check.
    SetCardStatus { id: CardId, status: CardStatus },
    /// Sales and payments are immutable: inserted once, removed only by
    /// cascade.
    PutSale(Sale),
    DeleteSale(SaleId),
    PutPayment(CardPayment),
    DeletePayment(CardPaymentId),
}

/// Ledger persistence boundary.
pub trait LedgerStore: Send + Sync {
    fn bill(&self, id: BillId) -> Result<Option<Versioned<Bill>>, StoreError>;
    fn bills(&self) -> Result<Vec<Versioned<Bill>>, StoreError>;

    fn customer(&self, id: CustomerId) -> Result<Option<Versioned<Customer>>, StoreError>;
    fn customers(&self) -> Result<Vec<Versioned<Customer>>, StoreError>;

    fn card(&self, id: CardId) -> Result<Option<Versioned<CreditCard>>, StoreError>;
    fn cards(&self) -> Result<Vec<Versioned<CreditCard>>, StoreError>;

    fn sale(&self, id: SaleId) -> Result<Option<Sale>, StoreError>;
    fn sales(&self) -> Result<Vec<Sale>, StoreError>;

    fn payment(&self, id: CardPaymentId) -> Result<Option<CardPayment>, StoreError>;
    fn payments(&self) -> Result<Vec<CardPayment>, StoreError>;

    /// Apply every mutation or none of them.
    fn commit(&self, mutations: Vec<Mutation>) -> Result<(), StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn bill(&self, id: BillId) -> Result<Option<Versioned<Bill>>, StoreError> {
        (**self).bill(id)
    }

    fn bills(&self) -> Result<Vec<Versioned<Bill>>, StoreError> {
        (**self).bills()
    }

    fn customer(&self, id: CustomerId) -> Result<Option<Versioned<Customer>>, StoreError> {
        (**self).customer(id)
    }

    fn customers(&self) -> Result<Vec<Versioned<Customer>>, StoreError> {
        (**self).customers()
    }

    fn card(&self, id: CardId) -> Result<Option<Versioned<CreditCard>>, StoreError> {
        (**self).card(id)
    }

    fn cards(&self) -> Result<Vec<Versioned<CreditCard>>, StoreError> {
        (**self).cards()
    }

    fn sale(&self, id: SaleId) -> Result<Option<Sale>, StoreError> {
        (**self).sale(id)
    }

    fn sales(&self) -> Result<Vec<Sale>, StoreError> {
        (**self).sales()
    }

    fn payment(&self, id: CardPaymentId) -> Result<Option<CardPayment>, StoreError> {
        (**self).payment(id)
    }

    fn payments(&self) -> Result<Vec<CardPayment>, StoreError> {
        (**self).payments()
    }

    fn commit(&self, mutations: Vec<Mutation>) -> Result<(), StoreError> {
        (**self).commit(mutations)
    }
}

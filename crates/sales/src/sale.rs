use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use billbook_bills::{Bill, dedupe_ids, select_available};
use billbook_core::{
    BillId, CustomerId, Entity, LedgerError, LedgerResult, Money, Percentage, SaleId,
};
use billbook_customers::Customer;

/// How the customer settled the sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SalePaymentMethod {
    Cash,
    BankTransfer,
}

/// Caller input for a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleDraft {
    pub customer_id: CustomerId,
    pub bill_ids: Vec<BillId>,
    /// Human percentage, e.g. `10.0` for 10%.
    pub profit_pct: f64,
    pub payment_method: SalePaymentMethod,
    pub notes: Option<String>,
}

/// A completed sale. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    id: SaleId,
    customer_id: CustomerId,
    bill_ids: Vec<BillId>,
    profit_pct: Percentage,
    total: Money,
    profit_value: Money,
    payback: Money,
    payment_method: SalePaymentMethod,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl Sale {
    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn bill_ids(&self) -> &[BillId] {
        &self.bill_ids
    }

    pub fn profit_pct(&self) -> Percentage {
        self.profit_pct
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn profit_value(&self) -> Money {
        self.profit_value
    }

    pub fn payback(&self) -> Money {
        self.payback
    }

    pub fn payment_method(&self) -> SalePaymentMethod {
        self.payment_method
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for Sale {
    type Id = SaleId;

    fn id(&self) -> SaleId {
        self.id
    }

    fn kind() -> &'static str {
        "sale"
    }
}

/// Decided outcome of a sale: the record plus the bills as they must be
/// written back (already SOLD).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleSettlement {
    pub sale: Sale,
    pub sold_bills: Vec<Bill>,
}

/// Decide a sale against a snapshot of the customer and candidate bills.
///
/// Checks run in a fixed order so the reported reason is deterministic:
/// empty selection, customer state, percentage, bill availability, then
/// verified amounts. Nothing is mutated on failure.
pub fn settle_sale(
    id: SaleId,
    draft: &SaleDraft,
    customer: &Customer,
    bills: &[Bill],
    now: DateTime<Utc>,
) -> LedgerResult<SaleSettlement> {
    if draft.bill_ids.is_empty() {
        return Err(LedgerError::EmptySelection);
    }
    if customer.id() != draft.customer_id {
        return Err(LedgerError::CustomerNotFound(draft.customer_id));
    }
    customer.ensure_can_transact()?;

    let pct = Percentage::from_percent(draft.profit_pct)?;
    let selected = select_available(&draft.bill_ids, bills)?;

    let amounts = selected
        .iter()
        .map(|bill| bill.sale_amount())
        .collect::<LedgerResult<Vec<_>>>()?;
    let split = pct.split(Money::checked_sum(amounts)?)?;

    let mut sold_bills = Vec::with_capacity(selected.len());
    for bill in selected {
        let mut bill = bill.clone();
        bill.mark_sold()?;
        sold_bills.push(bill);
    }

    let sale = Sale {
        id,
        customer_id: draft.customer_id,
        bill_ids: dedupe_ids(&draft.bill_ids),
        profit_pct: pct,
        total: split.total,
        profit_value: split.profit_value,
        payback: split.payback,
        payment_method: draft.payment_method,
        notes: draft.notes.clone(),
        created_at: now,
    };

    Ok(SaleSettlement { sale, sold_bills })
}

/// A sale that was not created. No bill, customer or sale record changed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("sale aborted: {0}")]
pub struct SaleAborted(#[source] pub LedgerError);

impl SaleAborted {
    pub fn reason(&self) -> &LedgerError {
        &self.0
    }

    pub fn into_reason(self) -> LedgerError {
        self.0
    }
}

impl From<LedgerError> for SaleAborted {
    fn from(value: LedgerError) -> Self {
        Self(value)
    }
}

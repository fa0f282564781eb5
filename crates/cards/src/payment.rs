use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billbook_bills::{Bill, dedupe_ids, select_available};
use billbook_core::{
    BillId, CardId, CardPaymentId, Entity, LedgerError, LedgerResult, Money, Percentage,
};

use crate::card::CreditCard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CardPaymentMethod {
    /// Amount swiped directly on a POS terminal.
    Pos,
    /// Amount covered by selling verified bills.
    Bill,
}

/// Where the money for a "đáo" comes from. Exactly one source per payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "UPPERCASE")]
pub enum PaymentSource {
    Pos { amount: Money },
    Bill { bill_ids: Vec<BillId> },
}

impl PaymentSource {
    pub fn method(&self) -> CardPaymentMethod {
        match self {
            PaymentSource::Pos { .. } => CardPaymentMethod::Pos,
            PaymentSource::Bill { .. } => CardPaymentMethod::Bill,
        }
    }
}

/// Caller input for a card payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDraft {
    pub card_id: CardId,
    /// Human percentage; required even though it is optional on the wire.
    pub profit_pct: Option<f64>,
    pub source: PaymentSource,
    pub notes: Option<String>,
}

/// Entity: CardPayment (one "đáo" settlement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPayment {
    id: CardPaymentId,
    card_id: CardId,
    payment_method: CardPaymentMethod,
    profit_pct: Percentage,
    total_amount: Money,
    profit_value: Money,
    payback: Money,
    bill_ids: Vec<BillId>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl CardPayment {
    pub fn card_id(&self) -> CardId {
        self.card_id
    }

    pub fn payment_method(&self) -> CardPaymentMethod {
        self.payment_method
    }

    pub fn profit_pct(&self) -> Percentage {
        self.profit_pct
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn profit_value(&self) -> Money {
        self.profit_value
    }

    pub fn payback(&self) -> Money {
        self.payback
    }

    /// Empty for POS payments.
    pub fn bill_ids(&self) -> &[BillId] {
        &self.bill_ids
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Entity for CardPayment {
    type Id = CardPaymentId;

    fn id(&self) -> CardPaymentId {
        self.id
    }

    fn kind() -> &'static str {
        "card_payment"
    }
}

/// Decided outcome of a card payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSettlement {
    pub payment: CardPayment,
    /// Bills to write back as SOLD; empty for POS.
    pub sold_bills: Vec<Bill>,
}

/// Decide a card payment against a snapshot of the card and candidate bills.
///
/// Checks run in order: card, profit percentage present, percentage range,
/// then the source (POS amount positive, or a non-empty selection of
/// AVAILABLE bills with verified amounts).
pub fn settle_payment(
    id: CardPaymentId,
    draft: &PaymentDraft,
    card: &CreditCard,
    bills: &[Bill],
    now: DateTime<Utc>,
) -> LedgerResult<PaymentSettlement> {
    if card.id() != draft.card_id {
        return Err(LedgerError::CardNotFound(draft.card_id));
    }
    let pct = draft
        .profit_pct
        .ok_or(LedgerError::MissingProfitPercentage)
        .and_then(Percentage::from_percent)?;

    let (total, bill_ids, sold_bills) = match &draft.source {
        PaymentSource::Pos { amount } => {
            if !amount.is_positive() {
                return Err(LedgerError::EmptyAmount);
            }
            (*amount, Vec::new(), Vec::new())
        }
        PaymentSource::Bill { bill_ids } => {
            if bill_ids.is_empty() {
                return Err(LedgerError::EmptySelection);
            }
            let selected = select_available(bill_ids, bills)?;
            let total = Money::checked_sum(
                selected
                    .iter()
                    .map(|bill| bill.sale_amount())
                    .collect::<LedgerResult<Vec<_>>>()?,
            )?;

            let mut sold = Vec::with_capacity(selected.len());
            for bill in selected {
                let mut bill = bill.clone();
                bill.mark_sold()?;
                sold.push(bill);
            }
            (total, dedupe_ids(bill_ids), sold)
        }
    };

    let split = pct.split(total)?;
    let payment = CardPayment {
        id,
        card_id: draft.card_id,
        payment_method: draft.source.method(),
        profit_pct: pct,
        total_amount: split.total,
        profit_value: split.profit_value,
        payback: split.payback,
        bill_ids,
        notes: draft.notes.clone(),
        created_at: now,
    };

    Ok(PaymentSettlement {
        payment,
        sold_bills,
    })
}

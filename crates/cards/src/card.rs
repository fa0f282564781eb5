use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billbook_core::{CardId, CustomerId, Entity, LedgerError, LedgerResult, Money};

/// Card status relative to the current billing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardStatus {
    #[serde(rename = "Chưa đến hạn")]
    NotDue,
    #[serde(rename = "Cần đáo")]
    NeedsCycling,
    #[serde(rename = "Đã đáo")]
    Cycled,
    #[serde(rename = "Quá Hạn")]
    Overdue,
}

impl CardStatus {
    /// Display label used on every user-facing surface.
    pub fn label(&self) -> &'static str {
        match self {
            CardStatus::NotDue => "Chưa đến hạn",
            CardStatus::NeedsCycling => "Cần đáo",
            CardStatus::Cycled => "Đã đáo",
            CardStatus::Overdue => "Quá Hạn",
        }
    }
}

impl core::fmt::Display for CardStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCard {
    pub customer_id: CustomerId,
    pub card_number: String,
    pub cardholder_name: String,
    pub bank_name: String,
    pub card_type: String,
    /// As printed on the card, e.g. "08/27".
    pub expiry_date: String,
    pub ccv: String,
    pub statement_day: u8,
    pub payment_due_day: u8,
    pub credit_limit: Money,
    pub notes: Option<String>,
}

/// Partial update; `None` keeps the existing value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardUpdate {
    pub card_number: Option<String>,
    pub cardholder_name: Option<String>,
    pub bank_name: Option<String>,
    pub card_type: Option<String>,
    pub expiry_date: Option<String>,
    pub ccv: Option<String>,
    pub statement_day: Option<u8>,
    pub payment_due_day: Option<u8>,
    pub credit_limit: Option<Money>,
    pub notes: Option<String>,
}

/// Entity: CreditCard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCard {
    id: CardId,
    customer_id: CustomerId,
    card_number: String,
    cardholder_name: String,
    bank_name: String,
    card_type: String,
    expiry_date: String,
    ccv: String,
    statement_day: u8,
    payment_due_day: u8,
    credit_limit: Money,
    status: CardStatus,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl CreditCard {
    pub fn create(id: CardId, new: NewCard, now: DateTime<Utc>) -> LedgerResult<Self> {
        let card_number = validate_number(&new.card_number)?;
        validate_day("statement_day", new.statement_day)?;
        validate_day("payment_due_day", new.payment_due_day)?;
        validate_limit(new.credit_limit)?;

        Ok(Self {
            id,
            customer_id: new.customer_id,
            card_number,
            cardholder_name: new.cardholder_name.trim().to_string(),
            bank_name: new.bank_name.trim().to_string(),
            card_type: new.card_type.trim().to_string(),
            expiry_date: new.expiry_date.trim().to_string(),
            ccv: new.ccv,
            statement_day: new.statement_day,
            payment_due_day: new.payment_due_day,
            credit_limit: new.credit_limit,
            status: CardStatus::NotDue,
            notes: new.notes,
            created_at: now,
        })
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn card_number(&self) -> &str {
        &self.card_number
    }

    /// `**** **** **** 1234`
    pub fn masked_number(&self) -> String {
        let digits: Vec<char> = self.card_number.chars().filter(char::is_ascii_digit).collect();
        let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
        format!("**** **** **** {tail}")
    }

    pub fn cardholder_name(&self) -> &str {
        &self.cardholder_name
    }

    pub fn bank_name(&self) -> &str {
        &self.bank_name
    }

    pub fn card_type(&self) -> &str {
        &self.card_type
    }

    pub fn expiry_date(&self) -> &str {
        &self.expiry_date
    }

    pub fn ccv(&self) -> &str {
        &self.ccv
    }

    pub fn statement_day(&self) -> u8 {
        self.statement_day
    }

    pub fn payment_due_day(&self) -> u8 {
        self.payment_due_day
    }

    pub fn credit_limit(&self) -> Money {
        self.credit_limit
    }

    /// Last persisted status. Callers wanting the current status must derive
    /// it from the date; see [`crate::derive_status`].
    pub fn status_snapshot(&self) -> CardStatus {
        self.status
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn set_status_snapshot(&mut self, status: CardStatus) {
        self.status = status;
    }

    /// Apply a partial update. Nothing changes when validation fails.
    pub fn apply_update(&mut self, update: CardUpdate) -> LedgerResult<()> {
        let card_number = match update.card_number {
            Some(number) => validate_number(&number)?,
            None => self.card_number.clone(),
        };
        let statement_day = update.statement_day.unwrap_or(self.statement_day);
        let payment_due_day = update.payment_due_day.unwrap_or(self.payment_due_day);
        validate_day("statement_day", statement_day)?;
        validate_day("payment_due_day", payment_due_day)?;
        let credit_limit = update.credit_limit.unwrap_or(self.credit_limit);
        validate_limit(credit_limit)?;

        self.card_number = card_number;
        self.statement_day = statement_day;
        self.payment_due_day = payment_due_day;
        self.credit_limit = credit_limit;
        if let Some(name) = update.cardholder_name {
            self.cardholder_name = name.trim().to_string();
        }
        if let Some(bank) = update.bank_name {
            self.bank_name = bank.trim().to_string();
        }
        if let Some(card_type) = update.card_type {
            self.card_type = card_type.trim().to_string();
        }
        if let Some(expiry) = update.expiry_date {
            self.expiry_date = expiry.trim().to_string();
        }
        if let Some(ccv) = update.ccv {
            self.ccv = ccv;
        }
        if update.notes.is_some() {
            self.notes = update.notes;
        }
        Ok(())
    }
}

impl Entity for CreditCard {
    type Id = CardId;

    fn id(&self) -> CardId {
        self.id
    }

    fn kind() -> &'static str {
        "card"
    }
}

fn validate_number(number: &str) -> LedgerResult<String> {
    let number: String = number.split_whitespace().collect();
    if number.is_empty() {
        return Err(LedgerError::validation("card_number cannot be empty"));
    }
    Ok(number)
}

fn validate_day(field: &str, day: u8) -> LedgerResult<()> {
    if !(1..=31).contains(&day) {
        return Err(LedgerError::validation(format!(
            "{field} must be between 1 and 31, got {day}"
        )));
    }
    Ok(())
}

fn validate_limit(limit: Money) -> LedgerResult<()> {
    if limit.is_negative() {
        return Err(LedgerError::invalid_amount(format!(
            "credit_limit {limit} is negative"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_card() -> NewCard {
        NewCard {
            customer_id: CustomerId::new(),
            card_number: "4111 1111 1111 1234".to_string(),
            cardholder_name: "NGUYEN VAN A".to_string(),
            bank_name: "VCB".to_string(),
            card_type: "VISA".to_string(),
            expiry_date: "08/27".to_string(),
            ccv: "123".to_string(),
            statement_day: 1,
            payment_due_day: 15,
            credit_limit: Money::new(50_000_000),
            notes: None,
        }
    }

    #[test]
    fn create_strips_spaces_and_masks() {
        let card = CreditCard::create(CardId::new(), new_card(), Utc::now()).unwrap();
        assert_eq!(card.card_number(), "4111111111111234");
        assert_eq!(card.masked_number(), "**** **** **** 1234");
        assert_eq!(card.status_snapshot(), CardStatus::NotDue);
    }

    #[test]
    fn rejects_days_outside_month_range() {
        for (s, d) in [(0, 15), (1, 32)] {
            let err = CreditCard::create(
                CardId::new(),
                NewCard {
                    statement_day: s,
                    payment_due_day: d,
                    ..new_card()
                },
                Utc::now(),
            )
            .unwrap_err();
            assert!(matches!(err, LedgerError::Validation(_)), "{s}/{d}");
        }
    }

    #[test]
    fn rejected_update_leaves_card_unchanged() {
        let mut card = CreditCard::create(CardId::new(), new_card(), Utc::now()).unwrap();
        let before = card.clone();
        let err = card
            .apply_update(CardUpdate {
                bank_name: Some("TCB".to_string()),
                payment_due_day: Some(40),
                ..CardUpdate::default()
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
        assert_eq!(card, before);

        card.apply_update(CardUpdate {
            bank_name: Some("TCB".to_string()),
            statement_day: Some(20),
            ..CardUpdate::default()
        })
        .unwrap();
        assert_eq!(card.bank_name(), "TCB");
        assert_eq!(card.statement_day(), 20);
    }

    #[test]
    fn status_serializes_with_vietnamese_labels() {
        let json = serde_json::to_string(&CardStatus::Overdue).unwrap();
        assert_eq!(json, "\"Quá Hạn\"");
        let parsed: CardStatus = serde_json::from_str("\"Cần đáo\"").unwrap();
        assert_eq!(parsed, CardStatus::NeedsCycling);
        assert_eq!(CardStatus::Cycled.to_string(), "Đã đáo");
    }
}

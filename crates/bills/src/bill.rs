use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billbook_core::{BillId, Entity, LedgerError, LedgerResult, Money};

use crate::verification::VerifiedRecord;

/// Placeholder name written onto a bill once the gateway reports the debt
/// as already settled.
pub const NO_DEBT_MARKER: &str = "KHÔNG CÓ NỢ";

/// Utility-provider zone a bill code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProviderRegion {
    North,
    South,
    Hcmc,
}

impl ProviderRegion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderRegion::North => "NORTH",
            ProviderRegion::South => "SOUTH",
            ProviderRegion::Hcmc => "HCMC",
        }
    }
}

impl core::fmt::Display for ProviderRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ProviderRegion {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NORTH" => Ok(ProviderRegion::North),
            "SOUTH" => Ok(ProviderRegion::South),
            "HCMC" | "HCM" => Ok(ProviderRegion::Hcmc),
            other => Err(LedgerError::validation(format!(
                "unknown provider region '{other}'"
            ))),
        }
    }
}

/// Bill status lifecycle.
///
/// ```text
/// AVAILABLE ──sale/payment──▶ SOLD      (terminal)
///     │ └──recheck: not owed──▶ CROSSED (terminal)
///     └──admin──▶ PENDING ──admin──▶ AVAILABLE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BillStatus {
    Available,
    Pending,
    Sold,
    Crossed,
}

impl BillStatus {
    /// SOLD and CROSSED bills are permanent records.
    pub fn is_terminal(self) -> bool {
        matches!(self, BillStatus::Sold | BillStatus::Crossed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Available => "AVAILABLE",
            BillStatus::Pending => "PENDING",
            BillStatus::Sold => "SOLD",
            BillStatus::Crossed => "CROSSED",
        }
    }
}

impl core::fmt::Display for BillStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manually entered bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBill {
    pub customer_code: String,
    pub provider_region: ProviderRegion,
    pub full_name: String,
    pub address: String,
    /// Unknown until the debt has been verified.
    pub amount: Option<Money>,
    pub billing_cycle: String,
    pub note: Option<String>,
}

/// Canonical form of an external customer code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Entity: Bill (a purchasable utility debt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
    id: BillId,
    customer_code: String,
    provider_region: ProviderRegion,
    full_name: String,
    address: String,
    amount: Option<Money>,
    billing_cycle: String,
    status: BillStatus,
    created_at: DateTime<Utc>,
    last_checked: Option<DateTime<Utc>>,
    note: Option<String>,
}

impl Bill {
    /// Manual entry; the bill starts AVAILABLE.
    pub fn create(id: BillId, new: NewBill, now: DateTime<Utc>) -> LedgerResult<Self> {
        let customer_code = validate_code(&new.customer_code)?;
        if let Some(amount) = new.amount {
            validate_amount(amount)?;
        }

        Ok(Self {
            id,
            customer_code,
            provider_region: new.provider_region,
            full_name: new.full_name.trim().to_string(),
            address: new.address.trim().to_string(),
            amount: new.amount,
            billing_cycle: new.billing_cycle.trim().to_string(),
            status: BillStatus::Available,
            created_at: now,
            last_checked: None,
            note: new.note,
        })
    }

    /// A bill born from a successful gateway lookup.
    pub fn from_verification(
        id: BillId,
        customer_code: &str,
        provider_region: ProviderRegion,
        record: &VerifiedRecord,
        now: DateTime<Utc>,
    ) -> LedgerResult<Self> {
        let customer_code = validate_code(customer_code)?;
        validate_amount(record.amount)?;

        Ok(Self {
            id,
            customer_code,
            provider_region,
            full_name: record.full_name.trim().to_string(),
            address: record.address.trim().to_string(),
            amount: Some(record.amount),
            billing_cycle: record.billing_cycle.trim().to_string(),
            status: BillStatus::Available,
            created_at: now,
            last_checked: Some(now),
            note: None,
        })
    }

    pub fn customer_code(&self) -> &str {
        &self.customer_code
    }

    pub fn provider_region(&self) -> ProviderRegion {
        self.provider_region
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn amount(&self) -> Option<Money> {
        self.amount
    }

    pub fn billing_cycle(&self) -> &str {
        &self.billing_cycle
    }

    pub fn status(&self) -> BillStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.last_checked
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn is_available(&self) -> bool {
        self.status == BillStatus::Available
    }

    /// Whether this is the live (non-terminal) bill for `code` + `region`.
    pub fn is_live_for(&self, code: &str, region: ProviderRegion) -> bool {
        !self.status.is_terminal()
            && self.provider_region == region
            && self.customer_code == normalize_code(code)
    }

    /// Amount used when the bill is sold; unverified bills cannot be sold.
    pub fn sale_amount(&self) -> LedgerResult<Money> {
        self.amount.ok_or_else(|| {
            LedgerError::invalid_amount(format!("bill {} has no verified amount", self.id))
        })
    }

    pub fn ensure_available(&self) -> LedgerResult<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(LedgerError::bill_not_available([self.id]))
        }
    }

    /// SOLD and CROSSED bills can never be deleted through bill deletion.
    pub fn ensure_deletable(&self) -> LedgerResult<()> {
        if self.status.is_terminal() {
            return Err(LedgerError::BillLocked(self.id));
        }
        Ok(())
    }

    /// Overwrite verified fields and stamp the check time.
    pub fn refresh(&mut self, record: &VerifiedRecord, now: DateTime<Utc>) -> LedgerResult<()> {
        if self.status.is_terminal() {
            return Err(LedgerError::BillLocked(self.id));
        }
        validate_amount(record.amount)?;

        self.full_name = record.full_name.trim().to_string();
        self.address = record.address.trim().to_string();
        self.amount = Some(record.amount);
        self.billing_cycle = record.billing_cycle.trim().to_string();
        self.last_checked = Some(now);
        Ok(())
    }

    /// AVAILABLE → SOLD.
    pub fn mark_sold(&mut self) -> LedgerResult<()> {
        self.ensure_available()?;
        self.status = BillStatus::Sold;
        Ok(())
    }

    /// AVAILABLE → CROSSED: the gateway no longer reports the debt.
    pub fn mark_crossed(&mut self, now: DateTime<Utc>) -> LedgerResult<()> {
        self.ensure_available()?;
        self.status = BillStatus::Crossed;
        self.full_name = NO_DEBT_MARKER.to_string();
        self.last_checked = Some(now);
        Ok(())
    }

    /// AVAILABLE → PENDING (administrative hold).
    pub fn mark_pending(&mut self) -> LedgerResult<()> {
        self.ensure_available()?;
        self.status = BillStatus::Pending;
        Ok(())
    }

    /// PENDING → AVAILABLE (administrative release).
    pub fn release_pending(&mut self) -> LedgerResult<()> {
        if self.status != BillStatus::Pending {
            return Err(LedgerError::validation(format!(
                "bill {} is {}, not PENDING",
                self.id, self.status
            )));
        }
        self.status = BillStatus::Available;
        Ok(())
    }

    pub fn set_note(&mut self, note: Option<String>) {
        self.note = note;
    }
}

impl Entity for Bill {
    type Id = BillId;

    fn id(&self) -> BillId {
        self.id
    }

    fn kind() -> &'static str {
        "bill"
    }
}

fn validate_code(code: &str) -> LedgerResult<String> {
    let code = normalize_code(code);
    if code.is_empty() {
        return Err(LedgerError::validation("customer_code cannot be empty"));
    }
    Ok(code)
}

fn validate_amount(amount: Money) -> LedgerResult<()> {
    if amount.is_negative() {
        return Err(LedgerError::invalid_amount(format!(
            "bill amount {amount} is negative"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn record(amount: i64) -> VerifiedRecord {
        VerifiedRecord {
            amount: Money::new(amount),
            full_name: "NGUYEN VAN A".to_string(),
            address: "12 Le Loi, Q1".to_string(),
            billing_cycle: "04/2025".to_string(),
        }
    }

    fn available_bill() -> Bill {
        Bill::from_verification(
            BillId::new(),
            " pa2204000000 ",
            ProviderRegion::North,
            &record(500_000),
            test_time(),
        )
        .unwrap()
    }

    #[test]
    fn verification_creates_available_bill_with_normalized_code() {
        let bill = available_bill();
        assert_eq!(bill.status(), BillStatus::Available);
        assert_eq!(bill.customer_code(), "PA2204000000");
        assert_eq!(bill.amount(), Some(Money::new(500_000)));
        assert!(bill.last_checked().is_some());
    }

    #[test]
    fn manual_entry_rejects_empty_code_and_negative_amount() {
        let new = NewBill {
            customer_code: "   ".to_string(),
            provider_region: ProviderRegion::South,
            full_name: String::new(),
            address: String::new(),
            amount: None,
            billing_cycle: String::new(),
            note: None,
        };
        assert!(matches!(
            Bill::create(BillId::new(), new.clone(), test_time()),
            Err(LedgerError::Validation(_))
        ));

        let negative = NewBill {
            customer_code: "PB01".to_string(),
            amount: Some(Money::new(-5)),
            ..new
        };
        assert!(matches!(
            Bill::create(BillId::new(), negative, test_time()),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn crossing_sets_no_debt_marker() {
        let mut bill = available_bill();
        bill.mark_crossed(test_time()).unwrap();
        assert_eq!(bill.status(), BillStatus::Crossed);
        assert_eq!(bill.full_name(), NO_DEBT_MARKER);
    }

    #[test]
    fn sold_bill_cannot_be_sold_again_or_deleted() {
        let mut bill = available_bill();
        bill.mark_sold().unwrap();

        match bill.mark_sold().unwrap_err() {
            LedgerError::BillNotAvailable { ids } => assert_eq!(ids, vec![bill.id()]),
            other => panic!("expected BillNotAvailable, got {other:?}"),
        }
        assert_eq!(bill.ensure_deletable(), Err(LedgerError::BillLocked(bill.id())));
    }

    #[test]
    fn pending_is_an_explicit_round_trip() {
        let mut bill = available_bill();
        bill.mark_pending().unwrap();
        assert_eq!(bill.status(), BillStatus::Pending);
        assert!(bill.mark_sold().is_err());
        assert!(bill.ensure_deletable().is_ok());

        bill.release_pending().unwrap();
        assert_eq!(bill.status(), BillStatus::Available);
        assert!(bill.release_pending().is_err());
    }

    #[test]
    fn unverified_bill_has_no_sale_amount() {
        let new = NewBill {
            customer_code: "PE0400".to_string(),
            provider_region: ProviderRegion::Hcmc,
            full_name: "TRAN B".to_string(),
            address: String::new(),
            amount: None,
            billing_cycle: String::new(),
            note: Some("typed in by hand".to_string()),
        };
        let bill = Bill::create(BillId::new(), new, test_time()).unwrap();
        assert!(matches!(bill.sale_amount(), Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn refresh_is_refused_on_terminal_bills() {
        let mut bill = available_bill();
        bill.refresh(&record(600_000), test_time()).unwrap();
        assert_eq!(bill.amount(), Some(Money::new(600_000)));

        bill.mark_sold().unwrap();
        assert_eq!(
            bill.refresh(&record(1), test_time()),
            Err(LedgerError::BillLocked(bill.id()))
        );
    }

    #[test]
    fn region_parses_case_insensitively() {
        assert_eq!("hcm".parse::<ProviderRegion>().unwrap(), ProviderRegion::Hcmc);
        assert_eq!(" north ".parse::<ProviderRegion>().unwrap(), ProviderRegion::North);
        assert!("west".parse::<ProviderRegion>().is_err());
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Sell,
        Cross,
        Hold,
        Release,
        Refresh,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Sell),
            Just(Op::Cross),
            Just(Op::Hold),
            Just(Op::Release),
            Just(Op::Refresh),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: status only ever moves along the allowed edges, and
        /// terminal bills stay terminal and delete-protected.
        #[test]
        fn status_follows_the_state_machine(ops in prop::collection::vec(op(), 1..20)) {
            let mut bill = available_bill();

            for op in ops {
                let before = bill.status();
                let result = match op {
                    Op::Sell => bill.mark_sold(),
                    Op::Cross => bill.mark_crossed(test_time()),
                    Op::Hold => bill.mark_pending(),
                    Op::Release => bill.release_pending(),
                    Op::Refresh => bill.refresh(&record(1_000), test_time()),
                };
                let after = bill.status();

                if result.is_err() {
                    prop_assert_eq!(before, after);
                }

                let allowed = before == after
                    || matches!(
                        (before, after),
                        (BillStatus::Available, BillStatus::Sold)
                            | (BillStatus::Available, BillStatus::Crossed)
                            | (BillStatus::Available, BillStatus::Pending)
                            | (BillStatus::Pending, BillStatus::Available)
                    );
                prop_assert!(allowed, "illegal transition {:?} -> {:?}", before, after);

                if before.is_terminal() {
                    prop_assert_eq!(before, after);
                }
                if after.is_terminal() {
                    prop_assert_eq!(bill.ensure_deletable(), Err(LedgerError::BillLocked(bill.id())));
                }
            }
        }
    }
}

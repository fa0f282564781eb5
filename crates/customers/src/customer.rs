use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billbook_core::{CustomerId, Entity, LedgerError, LedgerResult, Money};

/// Customer type: walk-in individual or reselling agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CustomerType {
    Individual,
    Agent,
}

/// Contact information for a customer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

impl ContactInfo {
    fn validate(&self) -> LedgerResult<()> {
        if let Some(email) = self.email.as_deref().map(str::trim) {
            if !email.is_empty() && !email.contains('@') {
                return Err(LedgerError::validation(format!(
                    "email '{email}' is not a valid address"
                )));
            }
        }
        Ok(())
    }
}

/// Running totals over every sale and card payment made for a customer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerStats {
    pub total_transactions: u64,
    pub total_value: Money,
    pub total_profit_generated: Money,
}

/// Input for registering a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub kind: CustomerType,
    #[serde(default)]
    pub contact: ContactInfo,
}

/// Partial update; `None` keeps the existing value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerUpdate {
    pub name: Option<String>,
    pub kind: Option<CustomerType>,
    pub contact: Option<ContactInfo>,
    pub is_active: Option<bool>,
}

/// Entity: Customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    id: CustomerId,
    name: String,
    kind: CustomerType,
    contact: ContactInfo,
    is_active: bool,
    created_at: DateTime<Utc>,
    stats: CustomerStats,
}

impl Customer {
    pub fn register(id: CustomerId, new: NewCustomer, now: DateTime<Utc>) -> LedgerResult<Self> {
        let name = validate_name(&new.name)?;
        new.contact.validate()?;

        Ok(Self {
            id,
            name,
            kind: new.kind,
            contact: new.contact,
            is_active: true,
            created_at: now,
            stats: CustomerStats::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CustomerType {
        self.kind
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn stats(&self) -> &CustomerStats {
        &self.stats
    }

    /// Inactive customers cannot be sold to.
    pub fn ensure_can_transact(&self) -> LedgerResult<()> {
        if !self.is_active {
            return Err(LedgerError::CustomerInactive(self.id));
        }
        Ok(())
    }

    /// Apply a partial update. Nothing changes when validation fails.
    pub fn apply_update(&mut self, update: CustomerUpdate) -> LedgerResult<()> {
        let name = match update.name {
            Some(name) => validate_name(&name)?,
            None => self.name.clone(),
        };
        let contact = update.contact.unwrap_or_else(|| self.contact.clone());
        contact.validate()?;

        self.name = name;
        self.contact = contact;
        if let Some(kind) = update.kind {
            self.kind = kind;
        }
        if let Some(active) = update.is_active {
            self.is_active = active;
        }
        Ok(())
    }

    /// Count one more sale or card payment toward the customer's totals.
    pub fn record_transaction(&mut self, value: Money, profit: Money) -> LedgerResult<()> {
        let total_value = Money::checked_sum([self.stats.total_value, value])?;
        let total_profit_generated = Money::checked_sum([self.stats.total_profit_generated, profit])?;

        self.stats = CustomerStats {
            total_transactions: self.stats.total_transactions + 1,
            total_value,
            total_profit_generated,
        };
        Ok(())
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    fn id(&self) -> CustomerId {
        self.id
    }

    fn kind() -> &'static str {
        "customer"
    }
}

fn validate_name(name: &str) -> LedgerResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::validation("name cannot be empty"));
    }
    Ok(name.to_string())
}

/// Listing filter for customers. Empty fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerFilter {
    pub kind: Option<CustomerType>,
    pub active: Option<bool>,
}

impl CustomerFilter {
    pub fn matches(&self, customer: &Customer) -> bool {
        self.kind.is_none_or(|k| k == customer.kind())
            && self.active.is_none_or(|a| a == customer.is_active())
    }
}

use serde::{Deserialize, Serialize};

use crate::bill::{Bill, BillStatus, ProviderRegion};

/// Listing filter for the bill inventory. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillFilter {
    pub status: Option<BillStatus>,
    pub region: Option<ProviderRegion>,
    /// Case-insensitive substring over code, holder name and address.
    pub search: Option<String>,
}

impl BillFilter {
    pub fn with_status(mut self, status: BillStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_region(mut self, region: ProviderRegion) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn matches(&self, bill: &Bill) -> bool {
        if self.status.is_some_and(|s| s != bill.status()) {
            return false;
        }
        if self.region.is_some_and(|r| r != bill.provider_region()) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                [bill.customer_code(), bill.full_name(), bill.address()]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            }
        }
    }
}

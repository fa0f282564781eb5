//! Availability gate run before a bill is committed to a sale or payment.

use std::collections::{HashMap, HashSet};

use billbook_core::{BillId, Entity, LedgerError, LedgerResult};

use crate::bill::Bill;

/// Drop repeated ids, keeping first-seen order.
pub fn dedupe_ids(ids: &[BillId]) -> Vec<BillId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Resolve `ids` against `bills` and require every one to be AVAILABLE.
///
/// Ids with no matching bill count as not available. On failure the error
/// lists every offending id, not just the first.
pub fn select_available<'a>(ids: &[BillId], bills: &'a [Bill]) -> LedgerResult<Vec<&'a Bill>> {
    let ids = dedupe_ids(ids);
    if ids.is_empty() {
        return Err(LedgerError::EmptySelection);
    }

    let by_id: HashMap<BillId, &Bill> = bills.iter().map(|b| (b.id(), b)).collect();

    let mut selected = Vec::with_capacity(ids.len());
    let mut unavailable = Vec::new();
    for id in ids {
        match by_id.get(&id) {
            Some(bill) if bill.is_available() => selected.push(*bill),
            _ => unavailable.push(id),
        }
    }

    if !unavailable.is_empty() {
        return Err(LedgerError::bill_not_available(unavailable));
    }
    Ok(selected)
}

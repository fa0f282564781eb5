use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, instrument, warn};

use billbook_core::{BillId, CustomerId, Entity, ExpectedVersion, LedgerError, LedgerResult};
use billbook_customers::{Customer, CustomerUpdate, NewCustomer};
use billbook_events::{EventBus, EventEnvelope};

use super::LedgerEngine;
use crate::activity::LedgerEvent;
use crate::store::{LedgerStore, Mutation, Versioned};

/// What a confirmed customer deletion removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerDeletion {
    pub customer_id: CustomerId,
    pub sales_removed: usize,
    pub cards_removed: usize,
    pub payments_removed: usize,
    pub bills_removed: usize,
}

impl<S, B> LedgerEngine<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<LedgerEvent>>,
{
    #[instrument(skip(self, new), fields(name = %new.name))]
    pub fn create_customer(&self, new: NewCustomer) -> LedgerResult<Customer> {
        let now = self.clock.now();
        let customer = Customer::register(CustomerId::new(), new, now)?;

        self.commit(vec![Mutation::PutCustomer {
            customer: customer.clone(),
            expected: ExpectedVersion::absent(),
        }])?;

        info!(customer_id = %customer.id(), "customer created");
        self.activity.publish(LedgerEvent::CustomerCreated {
            customer_id: customer.id(),
            name: customer.name().to_string(),
            occurred_at: now,
        });
        Ok(customer)
    }

    #[instrument(skip(self, update))]
    pub fn update_customer(
        &self,
        customer_id: CustomerId,
        update: CustomerUpdate,
    ) -> LedgerResult<Customer> {
        let current = self.require_customer(customer_id)?;
        let mut customer = current.value.clone();
        customer.apply_update(update)?;

        self.commit(vec![Mutation::PutCustomer {
            customer: customer.clone(),
            expected: current.expected_version(),
        }])?;

        info!(%customer_id, active = customer.is_active(), "customer updated");
        self.activity.publish(LedgerEvent::CustomerUpdated {
            customer_id,
            occurred_at: self.clock.now(),
        });
        Ok(customer)
    }

    /// Delete a customer together with its sales, its cards, those cards'
    /// payments and every bill those transactions referenced.
    ///
    /// Without `confirmed` nothing is removed and the error describes what
    /// would have been.
    #[instrument(skip(self))]
    pub fn delete_customer(
        &self,
        customer_id: CustomerId,
        confirmed: bool,
    ) -> LedgerResult<CustomerDeletion> {
        let current = self.require_customer(customer_id)?;

        let sales: Vec<_> = self
            .store
            .sales()?
            .into_iter()
            .filter(|sale| sale.customer_id() == customer_id)
            .collect();
        let cards: Vec<_> = self
            .store
            .cards()?
            .into_iter()
            .filter(|card| card.value.customer_id() == customer_id)
            .collect();
        let card_ids: HashSet<_> = cards.iter().map(|card| card.value.id()).collect();
        let payments: Vec<_> = self
            .store
            .payments()?
            .into_iter()
            .filter(|payment| card_ids.contains(&payment.card_id()))
            .collect();

        let referenced: Vec<BillId> = sales
            .iter()
            .flat_map(|sale| sale.bill_ids().iter().copied())
            .chain(payments.iter().flat_map(|p| p.bill_ids().iter().copied()))
            .collect();
        let bills = self.read_bills(&referenced)?;

        if !confirmed {
            return Err(LedgerError::ConfirmationRequired(format!(
                "deleting customer {customer_id} also removes {} sale(s), {} card(s), {} card payment(s) and {} bill(s)",
                sales.len(),
                cards.len(),
                payments.len(),
                bills.len()
            )));
        }

        let deletion = CustomerDeletion {
            customer_id,
            sales_removed: sales.len(),
            cards_removed: cards.len(),
            payments_removed: payments.len(),
            bills_removed: bills.len(),
        };

        let mut mutations = Vec::new();
        mutations.extend(payments.iter().map(|p| Mutation::DeletePayment(p.id())));
        mutations.extend(sales.iter().map(|s| Mutation::DeleteSale(s.id())));
        mutations.extend(bills.iter().map(|bill| Mutation::DeleteBill {
            id: bill.value.id(),
            expected: bill.expected_version(),
        }));
        mutations.extend(cards.iter().map(|card| Mutation::DeleteCard {
            id: card.value.id(),
            expected: card.expected_version(),
        }));
        mutations.push(Mutation::DeleteCustomer {
            id: customer_id,
            expected: current.expected_version(),
        });

        self.commit(mutations)?;

        warn!(
            %customer_id,
            sales = deletion.sales_removed,
            cards = deletion.cards_removed,
            payments = deletion.payments_removed,
            bills = deletion.bills_removed,
            "customer and history deleted"
        );
        self.activity.publish(LedgerEvent::CustomerDeleted {
            customer_id,
            sales_removed: deletion.sales_removed,
            cards_removed: deletion.cards_removed,
            payments_removed: deletion.payments_removed,
            bills_removed: deletion.bills_removed,
            occurred_at: self.clock.now(),
        });
        Ok(deletion)
    }

    pub(super) fn require_customer(&self, customer_id: CustomerId) -> LedgerResult<Versioned<Customer>> {
        self.store
            .customer(customer_id)?
            .ok_or(LedgerError::CustomerNotFound(customer_id))
    }
}

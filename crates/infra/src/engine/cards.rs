use tracing::{debug, info, instrument};

use billbook_cards::{
    BillingCycle, CardPayment, CardStatus, CardUpdate, CreditCard, NewCard, PaymentDraft,
    PaymentSource, billing_cycle, covers_cycle, derive_status, settle_payment,
};
use billbook_core::{CardId, CardPaymentId, Entity, ExpectedVersion, LedgerError, LedgerResult};
use billbook_events::{EventBus, EventEnvelope};

use super::LedgerEngine;
use crate::activity::LedgerEvent;
use crate::store::{LedgerStore, Mutation, Versioned};

impl<S, B> LedgerEngine<S, B>
where
    S: LedgerStore,
    B: EventBus<EventEnvelope<LedgerEvent>>,
{
    #[instrument(skip(self, new), fields(customer_id = %new.customer_id))]
    pub fn create_card(&self, new: NewCard) -> LedgerResult<CreditCard> {
        self.require_customer(new.customer_id)?;

        let now = self.clock.now();
        let mut card = CreditCard::create(CardId::new(), new, now)?;
        let (status, _) = self.card_status(&card, &[])?;
        card.set_status_snapshot(status);

        self.commit(vec![Mutation::PutCard {
            card: card.clone(),
            expected: ExpectedVersion::absent(),
        }])?;

        info!(card_id = %card.id(), card = %card.masked_number(), "card created");
        self.activity.publish(LedgerEvent::CardCreated {
            card_id: card.id(),
            customer_id: card.customer_id(),
            occurred_at: now,
        });
        Ok(card)
    }

    #[instrument(skip(self, update))]
    pub fn update_card(&self, card_id: CardId, update: CardUpdate) -> LedgerResult<CreditCard> {
        let current = self.require_card(card_id)?;
        let mut card = current.value.clone();
        card.apply_update(update)?;

        // Changed cycle days can change the status right away.
        let payments = self.card_payments(card_id)?;
        let (status, _) = self.card_status(&card, &payments)?;
        card.set_status_snapshot(status);

        self.commit(vec![Mutation::PutCard {
            card: card.clone(),
            expected: current.expected_version(),
        }])?;

        info!(%card_id, "card updated");
        self.activity.publish(LedgerEvent::CardUpdated {
            card_id,
            occurred_at: self.clock.now(),
        });
        Ok(card)
    }

    /// Delete a card and its payment records. Bills sold through those
    /// payments stay SOLD.
    #[instrument(skip(self))]
    pub fn delete_card(&self, card_id: CardId) -> LedgerResult<usize> {
        let current = self.require_card(card_id)?;
        let payments = self.card_payments(card_id)?;

        let mut mutations: Vec<Mutation> = payments
            .iter()
            .map(|payment| Mutation::DeletePayment(payment.id()))
            .collect();
        mutations.push(Mutation::DeleteCard {
            id: card_id,
            expected: current.expected_version(),
        });
        self.commit(mutations)?;

        info!(%card_id, payments = payments.len(), "card deleted");
        self.activity.publish(LedgerEvent::CardDeleted {
            card_id,
            payments_removed: payments.len(),
            occurred_at: self.clock.now(),
        });
        Ok(payments.len())
    }

    /// Record a "đáo" payment on a card.
    ///
    /// BILL payments sell their bills in the same commit; the card's snapshot
    /// becomes Cycled and the card owner's totals grow by the payment.
    #[instrument(skip(self, draft), fields(card_id = %draft.card_id, method = ?draft.source.method()))]
    pub fn create_payment(&self, draft: &PaymentDraft) -> LedgerResult<CardPayment> {
        let card = self
            .store
            .card(draft.card_id)?
            .ok_or(LedgerError::CardNotFound(draft.card_id))?;

        let rows = match &draft.source {
            PaymentSource::Bill { bill_ids } => self.read_bills(bill_ids)?,
            PaymentSource::Pos { .. } => Vec::new(),
        };
        let snapshot: Vec<_> = rows.iter().map(|row| row.value.clone()).collect();

        let now = self.clock.now();
        let settlement = settle_payment(CardPaymentId::new(), draft, &card.value, &snapshot, now)?;
        let payment = settlement.payment;

        let mut mutations = Vec::with_capacity(settlement.sold_bills.len() + 3);
        for bill in settlement.sold_bills {
            let expected = rows
                .iter()
                .find(|row| row.value.id() == bill.id())
                .map(|row| row.expected_version())
                .ok_or_else(|| LedgerError::bill_not_available([bill.id()]))?;
            mutations.push(Mutation::PutBill { bill, expected });
        }
        mutations.push(Mutation::SetCardStatus {
            id: card.value.id(),
            status: CardStatus::Cycled,
        });
        mutations.push(Mutation::RecordCustomerActivity {
            id: card.value.customer_id(),
            value: payment.total_amount(),
            profit: payment.profit_value(),
            require_active: false,
        });
        mutations.push(Mutation::PutPayment(payment.clone()));

        self.store
            .commit(mutations)
            .map_err(|err| self.commit_failure(err, payment.bill_ids()))?;

        info!(
            payment_id = %payment.id(),
            total = %payment.total_amount(),
            profit = %payment.profit_value(),
            "card payment recorded"
        );
        self.activity.publish(LedgerEvent::PaymentCreated {
            payment_id: payment.id(),
            card_id: payment.card_id(),
            method: payment.payment_method(),
            total_amount: payment.total_amount(),
            profit_value: payment.profit_value(),
            bill_ids: payment.bill_ids().to_vec(),
            occurred_at: now,
        });
        Ok(payment)
    }

    /// Re-derive every card's status and store it where the snapshot is
    /// stale. Returns how many snapshots changed.
    pub fn refresh_card_snapshots(&self) -> LedgerResult<usize> {
        let payments = self.store.payments()?;
        let mut mutations = Vec::new();
        for row in self.store.cards()? {
            let own: Vec<_> = payments
                .iter()
                .filter(|p| p.card_id() == row.value.id())
                .cloned()
                .collect();
            let (status, _) = self.card_status(&row.value, &own)?;
            if status != row.value.status_snapshot() {
                mutations.push(Mutation::SetCardStatus {
                    id: row.value.id(),
                    status,
                });
            }
        }

        let changed = mutations.len();
        if changed > 0 {
            self.commit(mutations)?;
        }
        debug!(changed, "card snapshots refreshed");
        Ok(changed)
    }

    /// Status of `card` today, given its payments.
    pub(super) fn card_status(
        &self,
        card: &CreditCard,
        payments: &[CardPayment],
    ) -> LedgerResult<(CardStatus, BillingCycle)> {
        let today = self.clock.today();
        let cycle = billing_cycle(card, today)?;
        let paid = payments
            .iter()
            .any(|payment| covers_cycle(&cycle, payment.created_at()));
        Ok((derive_status(&cycle, today, paid), cycle))
    }

    /// Payments on one card, newest first.
    pub(super) fn card_payments(&self, card_id: CardId) -> LedgerResult<Vec<CardPayment>> {
        let mut payments: Vec<_> = self
            .store
            .payments()?
            .into_iter()
            .filter(|payment| payment.card_id() == card_id)
            .collect();
        payments.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(payments)
    }

    pub(super) fn require_card(&self, card_id: CardId) -> LedgerResult<Versioned<CreditCard>> {
        self.store
            .card(card_id)?
            .ok_or(LedgerError::CardNotFound(card_id))
    }
}

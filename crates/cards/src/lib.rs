//! Credit-card domain module.
//!
//! Cards, their monthly billing cycle and the "đáo" payments that settle a
//! cycle on the customer's behalf. Status is always derived from the date and
//! the payment history; the stored status is only a snapshot.

pub mod card;
pub mod cycle;
pub mod payment;

pub use card::{CardStatus, CardUpdate, CreditCard, NewCard};
pub use cycle::{BillingCycle, billing_cycle, covers_cycle, derive_status};
pub use payment::{
    CardPayment, CardPaymentMethod, PaymentDraft, PaymentSettlement, PaymentSource,
    settle_payment,
};

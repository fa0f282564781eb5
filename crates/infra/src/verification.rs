//! External debt-verification gateway.
//!
//! The provider lookup itself is an adapter supplied by the embedding
//! application (HTTP scraper, vendor SDK, ...). The ledger only sees
//! [`VerificationOutcome`]s and the two failure modes below.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use billbook_bills::{ProviderRegion, VerificationOutcome};
use billbook_core::{LedgerError, LedgerResult};

/// Looks up whether a customer code still owes a debt.
#[async_trait]
pub trait VerificationAdapter: Send + Sync {
    async fn check(
        &self,
        customer_code: &str,
        region: ProviderRegion,
    ) -> anyhow::Result<VerificationOutcome>;
}

#[async_trait]
impl<A> VerificationAdapter for Arc<A>
where
    A: VerificationAdapter + ?Sized,
{
    async fn check(
        &self,
        customer_code: &str,
        region: ProviderRegion,
    ) -> anyhow::Result<VerificationOutcome> {
        (**self).check(customer_code, region).await
    }
}

/// Adapter wrapper that bounds every call by a timeout and maps failures
/// onto the ledger error taxonomy. Calls are never retried here.
#[derive(Clone)]
pub struct Gateway {
    adapter: Arc<dyn VerificationAdapter>,
    timeout: Duration,
}

impl core::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Gateway")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    pub fn new(adapter: Arc<dyn VerificationAdapter>, timeout: Duration) -> Self {
        Self { adapter, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn verify(
        &self,
        customer_code: &str,
        region: ProviderRegion,
    ) -> LedgerResult<VerificationOutcome> {
        match tokio::time::timeout(self.timeout, self.adapter.check(customer_code, region)).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(err)) => {
                warn!(customer_code, %region, error = %err, "verification gateway failed");
                Err(LedgerError::GatewayError(format!("{err:#}")))
            }
            Err(_) => {
                let after_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(customer_code, %region, after_ms, "verification gateway timed out");
                Err(LedgerError::GatewayTimeout {
                    code: customer_code.to_string(),
                    after_ms,
                })
            }
        }
    }
}

pub mod bandwidth;
pub mod quota;

use std::sync::Arc;

use tally_core::{MeteringError, Namespace, TenantId};
use tally_state::{KeyKind, StateKey, StateStore};

use crate::clock::Clock;
use crate::metrics::MeterMetrics;

pub use bandwidth::BandwidthLedger;
pub use quota::QuotaLedger;

/// Handles shared by every ledger and the alert engine.
#[derive(Clone)]
pub struct LedgerContext {
    pub store: Arc<dyn StateStore>,
    pub namespace: Namespace,
    pub clock: Arc<dyn Clock>,
    pub metrics: Arc<MeterMetrics>,
}

impl LedgerContext {
    /// Key for one of `tenant`'s records. Fails for tenant ids that would not
    /// survive as a single key segment.
    pub(crate) fn key(
        &self,
        tenant: &TenantId,
        kind: KeyKind,
        id: impl Into<String>,
    ) -> Result<StateKey, MeteringError> {
        tenant.validate()?;
        Ok(StateKey::new(self.namespace.clone(), tenant.clone(), kind, id))
    }
}

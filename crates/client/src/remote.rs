use async_trait::async_trait;
use tracing::{instrument, warn};

use tally_core::{AdmissionGrant, AdmissionRequest, MeteringError, Principal};
use tally_gateway::Admission;

use crate::MeteringClient;

/// [`Admission`] backed by a remote metering service.
///
/// The principal's credential is forwarded as the bearer token. A timeout,
/// transport failure or any non-2xx response is a denial.
#[derive(Debug, Clone)]
pub struct RemoteAdmission {
    client: MeteringClient,
}

impl RemoteAdmission {
    pub fn new(client: MeteringClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Admission for RemoteAdmission {
    #[instrument(name = "remote_admission.authorize", skip_all, fields(tenant = %principal.tenant, volume_mb = request.volume_mb))]
    async fn authorize(
        &self,
        principal: &Principal,
        request: &AdmissionRequest,
    ) -> Result<AdmissionGrant, MeteringError> {
        let grant = self
            .client
            .authorize_as(request, principal.credential.as_deref())
            .await
            .map_err(|e| {
                warn!(error = %e, "remote admission failed, denying");
                MeteringError::from(e)
            })?;
        if grant.tenant_id != principal.tenant {
            warn!(charged = %grant.tenant_id, "remote authority charged a different tenant");
            return Err(MeteringError::UpstreamUnavailable(format!(
                "metering service admitted '{}' instead of '{}'",
                grant.tenant_id, principal.tenant
            )));
        }
        Ok(grant)
    }
}

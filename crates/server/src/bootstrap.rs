use std::sync::Arc;

use tracing::info;

use tally_client::{MeteringClient, RemoteAdmission};
use tally_gateway::Meter;

use crate::api::AppState;
use crate::auth::TokenVerifier;
use crate::config::TallyConfig;
use crate::error::ServerError;
use crate::{audit_factory, blob_factory, state_factory};

/// Wire stores, audit, admission and auth from configuration.
pub async fn build_state(config: &TallyConfig) -> Result<AppState, ServerError> {
    let store = state_factory::create_state(&config.state)?;
    let blobs = blob_factory::create_blob_store(&config.blob).await?;
    let audit = audit_factory::create_audit(&config.audit)?;

    let mut builder = Meter::builder()
        .state(store)
        .blobs(blobs)
        .audit(audit.dispatcher)
        .limits(config.limits.clone())
        .namespace(config.admission.namespace.as_str())
        .mode(config.admission.mode)
        .alert_policy(config.admission.alert_policy)
        .admission_timeout(config.admission.timeout());

    if let Some(url) = &config.admission.remote_url {
        let client = MeteringClient::builder(url.as_str())
            .timeout(config.admission.timeout())
            .build()
            .map_err(|e| ServerError::Config(format!("remote admission: {e}")))?;
        info!(url = %url, "delegating admission to remote authority");
        builder = builder.remote_admission(Arc::new(RemoteAdmission::new(client)));
    }

    let meter = builder
        .build()
        .map_err(|e| ServerError::Config(e.to_string()))?;

    let mut state = AppState::new(Arc::new(meter));
    if config.auth.enabled {
        state = state.with_auth(Arc::new(TokenVerifier::new(&config.auth)?));
    }
    if let Some(log) = audit.log {
        state = state.with_audit_log(log);
    }

    info!(
        state = %config.state.backend,
        blob = %config.blob.backend,
        mode = ?config.admission.mode,
        alert_policy = ?config.admission.alert_policy,
        auth = config.auth.enabled,
        "metering service assembled"
    );
    Ok(state)
}

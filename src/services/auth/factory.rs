/// Factory: build the key verifier from application `Config`.
use std::sync::Arc;

use crate::config::Config;
use crate::services::auth::{KeyVerifier, UnkeyClient, UnkeySetupError};

pub fn build_key_verifier(config: &Config) -> Result<Arc<dyn KeyVerifier>, UnkeySetupError> {
    let client = UnkeyClient::new(&config.unkey)?;

    tracing::info!(
        backend = client.backend_name(),
        verify_url = %client.verify_url(),
        api_id = %config.unkey.api_id,
        "key verifier ready"
    );

    Ok(Arc::new(client))
}

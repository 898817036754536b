use salvo::prelude::*;

use wagate_core::error::GatewayError;

/// Guards the `/api-keys` admin surface with a shared secret: the
/// `x-secret-key` header must match the process's configured secret,
/// compared verbatim since the secret never leaves the operator's own
/// infrastructure.
#[handler]
pub async fn auth_by_secret_key(req: &mut Request) -> Result<(), GatewayError> {
    let provided = req
        .headers()
        .get("x-secret-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if provided.is_empty() || provided != crate::config::get().secret_key {
        return Err(GatewayError::AuthRejected);
    }
    Ok(())
}

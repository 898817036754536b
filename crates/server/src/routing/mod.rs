//! HTTP routing: the admin `/api-keys` surface and the `/whatsapp`
//! session-lifecycle surface, assembled under a configurable prefix.

mod api_keys;
mod whatsapp;

use salvo::prelude::*;

/// Builds the full router under `config::get().api_prefix`, plus the
/// unprefixed `/healthz` liveness probe every long-running service in this
/// workspace exposes.
pub fn router() -> Router {
    Router::new()
        .hoop(crate::hoops::access_control)
        .push(
            Router::with_path(crate::config::get().api_prefix.trim_start_matches('/'))
                .push(api_keys::router())
                .push(whatsapp::router()),
        )
        .push(Router::with_path("healthz").get(health_check))
}

#[handler]
async fn health_check() -> &'static str {
    "ok"
}

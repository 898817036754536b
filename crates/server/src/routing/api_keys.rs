//! Admin surface: list/generate/deactivate tenant API keys. Guarded by the
//! shared-secret hoop, never by the Tenant Key Registry itself.

use salvo::prelude::*;
use serde::Deserialize;
use wagate_core::error::{Envelope, GatewayError, GatewayResult};

pub fn router() -> Router {
    Router::with_path("api-keys")
        .hoop(crate::hoops::auth_by_secret_key)
        .get(list)
        .post(create)
        .push(Router::with_path("{key}").delete(deactivate))
}

#[handler]
async fn list(res: &mut Response) -> GatewayResult<()> {
    let keys = wagate_data::keys::list()?;
    res.render(salvo::writing::Json(Envelope::data(keys)));
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CreateApiKeyBody {
    #[serde(default)]
    label: Option<String>,
}

#[handler]
async fn create(req: &mut Request, res: &mut Response) -> GatewayResult<()> {
    let body: CreateApiKeyBody = req.parse_json().await.unwrap_or(CreateApiKeyBody { label: None });
    let key = wagate_data::keys::generate(body.label.as_deref())?;
    res.status_code(salvo::http::StatusCode::CREATED);
    res.render(salvo::writing::Json(Envelope::data(key)));
    Ok(())
}

#[handler]
async fn deactivate(req: &mut Request, res: &mut Response) -> GatewayResult<()> {
    let key = req.param::<String>("key").ok_or_else(|| GatewayError::validation("missing key"))?;
    match wagate_data::keys::deactivate(&key)? {
        Some(key) => {
            res.render(salvo::writing::Json(Envelope::data(key)));
        }
        None => {
            res.status_code(salvo::http::StatusCode::NOT_FOUND);
            res.render(salvo::writing::Json(Envelope::<()>::error("API key not found")));
        }
    }
    Ok(())
}

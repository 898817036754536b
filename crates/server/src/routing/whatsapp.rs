//! The `/whatsapp` surface: session listing, QR pairing, logout, status,
//! the SSE event stream, and message sending. Thin handlers over the
//! Session Supervisor — all lifecycle logic lives there, not here.

use futures_util::StreamExt as _;
use salvo::prelude::*;
use serde::Deserialize;
use wagate_core::error::{Envelope, GatewayError, GatewayResult};

use crate::event_bus::EVENT_BUS;
use crate::supervisor;

pub fn router() -> Router {
    Router::with_path("whatsapp")
        .push(Router::with_path("sessions").get(list_sessions).push(
            Router::with_path("{api_key}")
                .push(Router::with_path("qr").post(get_qr))
                .push(Router::with_path("logout").post(logout))
                .push(Router::with_path("status").get(status))
                .push(Router::with_path("stream").get(stream)),
        ))
        .push(
            Router::with_path("message")
                .push(Router::with_path("{api_key}").push(Router::with_path("send").post(send_text))),
        )
}

fn path_api_key(req: &Request) -> GatewayResult<String> {
    req.param::<String>("api_key")
        .ok_or_else(|| GatewayError::validation("missing apiKey in path"))
}

#[handler]
async fn list_sessions(res: &mut Response) -> GatewayResult<()> {
    let sessions = wagate_data::sessions::list()?;
    res.render(salvo::writing::Json(Envelope::data(sessions.into_iter().map(session_summary).collect::<Vec<_>>())));
    Ok(())
}

fn session_summary(row: wagate_data::sessions::DbSession) -> serde_json::Value {
    serde_json::json!({
        "apiKey": row.api_key,
        "displayName": row.display_name,
        "status": row.status(),
    })
}

#[derive(Debug, Deserialize, Default)]
struct GetQrBody {
    #[serde(default)]
    display_name: Option<String>,
}

#[handler]
async fn get_qr(req: &mut Request, res: &mut Response) -> GatewayResult<()> {
    let api_key = path_api_key(req)?;
    let body: GetQrBody = req.parse_json().await.unwrap_or_default();
    let result = supervisor::get().get_qr(&api_key, body.display_name.as_deref()).await?;
    res.render(salvo::writing::Json(Envelope::data(result)));
    Ok(())
}

#[handler]
async fn logout(req: &mut Request, res: &mut Response) -> GatewayResult<()> {
    let api_key = path_api_key(req)?;
    supervisor::get().logout(&api_key).await?;
    res.render(salvo::writing::Json(Envelope::<()>::message("Logged out")));
    Ok(())
}

#[handler]
async fn status(req: &mut Request, res: &mut Response) -> GatewayResult<()> {
    let api_key = path_api_key(req)?;
    let info = supervisor::get().get_connection_status(&api_key).await?;
    res.render(salvo::writing::Json(Envelope::data(info)));
    Ok(())
}

#[handler]
async fn stream(req: &mut Request, res: &mut Response) -> GatewayResult<()> {
    let api_key = path_api_key(req)?;
    wagate_data::keys::assert_active(&api_key)?;

    let initial_status = supervisor::get().get_connection_status(&api_key).await.ok();
    let initial_qr = supervisor::get().get_current_qr(&api_key);
    let events = EVENT_BUS.subscribe(&api_key, initial_status, initial_qr).map(Ok::<_, std::convert::Infallible>);

    let headers = res.headers_mut();
    headers.insert("Cache-Control", "no-cache, no-transform".parse().expect("header value"));
    headers.insert("X-Accel-Buffering", "no".parse().expect("header value"));
    headers.insert("Connection", "keep-alive".parse().expect("header value"));

    salvo::sse::streaming(res, events).map_err(GatewayError::internal)?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SendTextBody {
    to: String,
    text: String,
}

#[handler]
async fn send_text(req: &mut Request, res: &mut Response) -> GatewayResult<()> {
    let api_key = path_api_key(req)?;
    let body: SendTextBody = req
        .parse_json()
        .await
        .map_err(|_| GatewayError::validation("Invalid request body"))?;
    let result = supervisor::get().send_text(&api_key, &body.to, &body.text).await?;
    res.render(salvo::writing::Json(Envelope::data(result)));
    Ok(())
}

//! Salvo middleware ("hoops" in salvo's vocabulary): CORS, admin
//! authentication, and error rendering for statuses the router itself
//! produces rather than a handler returning a [`wagate_core::error::GatewayError`].

use salvo::http::ResBody;
use salvo::prelude::*;

use wagate_core::error::Envelope;

mod auth;
pub use auth::auth_by_secret_key;

/// Reflects the request's `Origin` back with credentials allowed.
/// Credentialed CORS only makes sense against a concrete origin, never `*`,
/// so a request with no `Origin` header falls back to a plain `*` with no
/// `Allow-Credentials`.
#[handler]
pub async fn access_control(req: &mut Request, res: &mut Response, depot: &mut Depot, ctrl: &mut FlowCtrl) {
    let origin = req
        .headers()
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    ctrl.call_next(req, depot, res).await;

    match origin {
        Some(origin) => {
            let headers = res.headers_mut();
            headers.insert("Access-Control-Allow-Origin", origin.parse().expect("header value"));
            headers.insert("Access-Control-Allow-Credentials", "true".parse().expect("header value"));
            headers.insert("Vary", "Origin".parse().expect("header value"));
        }
        None => {
            res.headers_mut().insert("Access-Control-Allow-Origin", "*".parse().expect("header value"));
        }
    }
    res.headers_mut().insert(
        "Access-Control-Allow-Methods",
        "GET,POST,DELETE,OPTIONS".parse().expect("header value"),
    );
    res.headers_mut().insert(
        "Access-Control-Allow-Headers",
        "Content-Type,x-secret-key".parse().expect("header value"),
    );
}

/// Renders 404/405 (and anything else salvo raised before a handler ran) in
/// the same envelope shape a [`GatewayError`](wagate_core::error::GatewayError)
/// would produce, so API clients see one response format regardless of where
/// the rejection happened.
#[handler]
pub async fn catch_status_error(res: &mut Response) {
    if let ResBody::Error(err) = &res.body {
        let message = err.brief.clone();
        res.render(salvo::writing::Json(Envelope::<()>::error(message)));
    } else if res.status_code == Some(StatusCode::METHOD_NOT_ALLOWED) {
        res.render(salvo::writing::Json(Envelope::<()>::error("method not allowed")));
    }
}

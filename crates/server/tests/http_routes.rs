//! HTTP-surface tests that don't require a live Postgres: the admin guard
//! and the liveness probe. Flows that create a session row need
//! `wagate_data`'s Diesel pool and are exercised against a real database
//! outside this suite.

use std::sync::Once;

use salvo::prelude::*;
use salvo::test::{ResponseExt, TestClient};
use wagate_data::DbConfig;
use wagate_server::config::{self, ServerConfig};

static INIT: Once = Once::new();

fn install_config() {
    INIT.call_once(|| {
        config::set(ServerConfig {
            listen_addr: "0.0.0.0:0".into(),
            api_prefix: "/api/v1".into(),
            secret_key: "test-secret".into(),
            db: DbConfig {
                url: "postgres://localhost/gateway".into(),
                pool_size: 1,
                min_idle: None,
                connection_timeout: 1_000,
                statement_timeout: 1_000,
                helper_threads: 1,
                enforce_tls: false,
                tcp_timeout: 1_000,
            },
            rust_log: "info".into(),
            log_format: "fmt".into(),
            qr_wait_seconds: 60,
            connect_wait_seconds: 20,
            warmup_wait_seconds: 15,
        });
    });
}

#[tokio::test]
async fn healthz_is_reachable_without_any_auth() {
    install_config();
    let service = Service::new(wagate_server::routing::router());

    let content = TestClient::get("http://127.0.0.1:5800/healthz")
        .send(&service)
        .await
        .take_string()
        .await
        .expect("body");
    assert_eq!(content, "ok");
}

#[tokio::test]
async fn listing_api_keys_without_the_secret_header_is_rejected() {
    install_config();
    let service = Service::new(wagate_server::routing::router());

    let mut response = TestClient::get("http://127.0.0.1:5800/api/v1/api-keys").send(&service).await;
    assert_eq!(response.status_code, Some(StatusCode::FORBIDDEN));

    let body: serde_json::Value = response.take_json().await.expect("json body");
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Invalid secret key");
}

#[tokio::test]
async fn listing_api_keys_with_the_wrong_secret_header_is_rejected() {
    install_config();
    let service = Service::new(wagate_server::routing::router());

    let response = TestClient::get("http://127.0.0.1:5800/api/v1/api-keys")
        .add_header("x-secret-key", "not-it", true)
        .send(&service)
        .await;
    assert_eq!(response.status_code, Some(StatusCode::FORBIDDEN));
}

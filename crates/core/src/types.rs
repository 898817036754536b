//! Domain types shared across the data and server crates.

use chrono::{DateTime, Utc};
use salvo::oapi::ToSchema;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::serde::Base64Bytes;

/// A tenant's opaque API key record.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub key: String,
    pub label: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The lifecycle state of one tenant's WhatsApp session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum SessionStatus {
    Connected,
    Disconnected,
    Qr,
    LoggedOut,
    Error,
}

/// `{apiKey, status, connected}` — the payload of `GET .../status` and the
/// `status` SSE event.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub api_key: String,
    pub status: SessionStatus,
    pub connected: bool,
}

/// Root Signal-protocol credential blob. Binary fields are wrapped in
/// [`Base64Bytes`] so the whole structure round-trips through JSON without
/// loss.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Creds {
    pub registration_id: u32,
    pub identity_public: Base64Bytes,
    pub identity_private: Base64Bytes,
    pub signed_pre_key: Base64Bytes,
    pub advertising_id: Option<String>,
    /// Everything else the upstream library attaches; preserved verbatim so
    /// the gateway never has to track the upstream schema field-by-field.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One `(type, keyId) -> value` Signal key row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignalKey {
    pub key_type: String,
    pub key_id: String,
    pub value: serde_json::Value,
}

/// Export used by the read-only diagnostics operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CredentialDump {
    pub creds: Option<Creds>,
    pub keys: Vec<SignalKey>,
}

/// `{apiKey, status, qr?}` — the response of `POST .../qr`.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QrResult {
    pub api_key: String,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
}

/// Result of `warmSessions()`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct WarmupReport {
    pub total: usize,
    pub attempted: usize,
    pub connected: usize,
    pub failed: usize,
}

/// Result of a successful `sendText` call.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub message_id: String,
}

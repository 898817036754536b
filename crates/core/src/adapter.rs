//! The narrow facade hiding the WhatsApp Web multi-device client from the
//! Session Supervisor. No Rust crate on the public registry speaks that
//! protocol, so this boundary is the full extent of that integration: a
//! production deployment implements [`UpstreamAdapter`] against a real
//! client and swaps it in without touching the Supervisor.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::GatewayResult;
use crate::types::Creds;

/// `lastDisconnect.error.statusCode` sentinel meaning "the session was
/// logged out on the phone".
pub const LOGGED_OUT_STATUS_CODE: u16 = 401;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connection {
    Connecting,
    Open,
    Close,
}

/// One `connection.update` event: fields are optional because the
/// Supervisor switches on presence, not on a shared dispatch tag.
#[derive(Clone, Debug, Default)]
pub struct ConnectionUpdate {
    pub connection: Option<Connection>,
    pub qr: Option<String>,
    pub last_disconnect_status_code: Option<u16>,
}

impl ConnectionUpdate {
    pub fn is_logged_out(&self) -> bool {
        self.last_disconnect_status_code == Some(LOGGED_OUT_STATUS_CODE)
    }
}

/// Read side of the Credential Store, as handed to the upstream library's
/// `keys.get` callback during auth-state assembly.
#[async_trait]
pub trait KeyReader: Send + Sync {
    async fn get(&self, key_type: &str, ids: &[String]) -> GatewayResult<Vec<(String, Option<serde_json::Value>)>>;
}

/// Write side of the Credential Store, as handed to the upstream library's
/// `keys.set` callback.
#[async_trait]
pub trait KeyWriter: Send + Sync {
    async fn set(&self, key_type: &str, values: Vec<(String, Option<serde_json::Value>)>) -> GatewayResult<()>;
}

/// One live upstream socket. The Supervisor treats this as single-threaded
/// per socket: it never issues two concurrent writes against the same
/// instance.
#[async_trait]
pub trait UpstreamSocket: Send + Sync {
    /// Subscriber side of the `creds.update` stream; fires whenever the
    /// upstream library wants the current root credentials persisted.
    fn creds_update(&mut self) -> mpsc::Receiver<Creds>;

    /// Subscriber side of the `connection.update` stream.
    fn connection_update(&mut self) -> mpsc::Receiver<ConnectionUpdate>;

    async fn send_text(&self, jid: &str, text: &str) -> GatewayResult<String>;

    /// Ask the phone to log this device out. May fail; callers log and
    /// proceed to `close()` regardless.
    async fn logout(&self) -> GatewayResult<()>;

    /// Forcefully tear down the socket, irrespective of `logout`'s outcome.
    async fn close(&self);

    /// True iff this socket currently has a bound user identity.
    fn has_bound_user(&self) -> bool;
}

/// Options passed to `newSocket`: auth-state plus the current protocol
/// version.
pub struct SocketOptions {
    pub api_key: String,
    pub auth_creds: Creds,
    pub version: (u16, u16, u16),
}

/// Factory for sockets and process-wide version resolution.
#[async_trait]
pub trait UpstreamAdapter: Send + Sync {
    async fn new_socket(
        &self,
        options: SocketOptions,
        keys: std::sync::Arc<dyn KeyReader>,
        key_writer: std::sync::Arc<dyn KeyWriter>,
    ) -> GatewayResult<Box<dyn UpstreamSocket>>;

    /// The current WhatsApp Web protocol version, memoised per process by
    /// the caller.
    async fn fetch_version(&self) -> (u16, u16, u16);

    /// Synthesises a fresh, empty root credential set for first pairing.
    fn init_auth_creds(&self) -> Creds;
}

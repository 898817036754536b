//! Session Supervisor: the core state machine driving each tenant's
//! WhatsApp Web session from DISCONNECTED through pairing, connection,
//! reconnect backoff, and logout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use wagate_core::adapter::{Connection, ConnectionUpdate, KeyReader, KeyWriter, SocketOptions, UpstreamAdapter, UpstreamSocket};
use wagate_core::error::{GatewayError, GatewayResult};
use wagate_core::msisdn;
use wagate_core::types::{ConnectionInfo, QrResult, SendResult, SessionStatus, WarmupReport};
use wagate_data::sessions::DbSession;

use crate::event_bus::EventBus;
use crate::global::{self, MANAGED_SESSIONS, OWNER_ID, RECONNECT_ATTEMPTS};

const LOCK_TTL_SECONDS: i64 = wagate_data::locks::TTL_SECONDS;
const RECONNECT_CAP_MS: u64 = 30_000;
const RECONNECT_JITTER_MS: u64 = 500;

type QrWaiter = oneshot::Sender<GatewayResult<String>>;
type ConnWaiter = oneshot::Sender<GatewayResult<()>>;

/// In-memory projection of one session's live state. Owned by the
/// process-global map; mutated only through [`Supervisor`] methods.
pub struct ManagedSession {
    pub api_key: String,
    pub session_id: i64,
    status: StdMutex<SessionStatus>,
    last_qr: StdMutex<Option<String>>,
    socket: AsyncMutex<Option<Box<dyn UpstreamSocket>>>,
    /// Serialises concurrent `initializeSocket` callers into one connect
    /// attempt: the second caller blocks here, then re-checks `has_socket`.
    connect_gate: AsyncMutex<()>,
    qr_waiters: StdMutex<Vec<QrWaiter>>,
    conn_waiters: StdMutex<Vec<ConnWaiter>>,
    holds_lock: AtomicBool,
    reconnect_task: StdMutex<Option<JoinHandle<()>>>,
}

impl ManagedSession {
    fn new(api_key: String, session_id: i64, status: SessionStatus) -> Arc<Self> {
        Arc::new(Self {
            api_key,
            session_id,
            status: StdMutex::new(status),
            last_qr: StdMutex::new(None),
            socket: AsyncMutex::new(None),
            connect_gate: AsyncMutex::new(()),
            qr_waiters: StdMutex::new(Vec::new()),
            conn_waiters: StdMutex::new(Vec::new()),
            holds_lock: AtomicBool::new(false),
            reconnect_task: StdMutex::new(None),
        })
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.lock().expect("managed session status lock")
    }

    fn set_status(&self, status: SessionStatus) {
        *self.status.lock().expect("managed session status lock") = status;
    }

    pub fn last_qr(&self) -> Option<String> {
        self.last_qr.lock().expect("managed session qr lock").clone()
    }

    async fn has_socket(&self) -> bool {
        self.socket.lock().await.is_some()
    }

    async fn has_bound_user(&self) -> bool {
        self.socket
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| s.has_bound_user())
    }

    fn cancel_reconnect_timer(&self) {
        if let Some(handle) = self.reconnect_task.lock().expect("reconnect task lock").take() {
            handle.abort();
        }
    }

    fn drain_qr_waiters(&self) -> Vec<QrWaiter> {
        std::mem::take(&mut *self.qr_waiters.lock().expect("qr waiters lock"))
    }

    fn drain_conn_waiters(&self) -> Vec<ConnWaiter> {
        std::mem::take(&mut *self.conn_waiters.lock().expect("conn waiters lock"))
    }
}

/// Delay for reconnect attempt `n` (n >= 1): exponential backoff capped at
/// [`RECONNECT_CAP_MS`], plus jitter to avoid synchronised reconnect storms.
pub fn reconnect_delay_ms(n: u32) -> u64 {
    let exp = n.saturating_sub(1).min(5);
    let base = RECONNECT_CAP_MS.min(1000 * (1u64 << exp));
    let jitter = rand::rng().random_range(0..RECONNECT_JITTER_MS);
    base + jitter
}

#[derive(Clone)]
pub struct Supervisor {
    adapter: Arc<dyn UpstreamAdapter>,
    bus: Arc<EventBus>,
}

static SUPERVISOR: OnceLock<Supervisor> = OnceLock::new();

/// The process-wide Supervisor instance, set once by `main` at startup.
pub fn get() -> &'static Supervisor {
    SUPERVISOR.get().expect("supervisor::set must run before supervisor::get")
}

impl Supervisor {
    pub fn new(adapter: Arc<dyn UpstreamAdapter>, bus: Arc<EventBus>) -> Self {
        Self { adapter, bus }
    }

    pub fn install(self) {
        SUPERVISOR.set(self).ok().expect("supervisor::install must run only once");
    }

    fn get_or_create_managed(&self, row: &DbSession) -> Arc<ManagedSession> {
        let mut map = MANAGED_SESSIONS.write().expect("managed sessions lock");
        map.entry(row.api_key.clone())
            .or_insert_with(|| ManagedSession::new(row.api_key.clone(), row.id, row.status()))
            .clone()
    }

    fn lookup_managed(&self, api_key: &str) -> Option<Arc<ManagedSession>> {
        MANAGED_SESSIONS.read().expect("managed sessions lock").get(api_key).cloned()
    }

    fn discard_managed(&self, api_key: &str) {
        MANAGED_SESSIONS.write().expect("managed sessions lock").remove(api_key);
        RECONNECT_ATTEMPTS.write().expect("reconnect attempts lock").remove(api_key);
    }

    // ---- getQr ----------------------------------------------------------

    pub async fn get_qr(&self, api_key: &str, display_name: Option<&str>) -> GatewayResult<QrResult> {
        wagate_data::keys::assert_active(api_key)?;
        let row = wagate_data::sessions::upsert(api_key, display_name)?;

        if row.status() == SessionStatus::LoggedOut {
            return Ok(QrResult { api_key: api_key.to_owned(), status: SessionStatus::LoggedOut, qr: None });
        }

        let managed = self.initialize_socket(&row).await?;

        if managed.status() == SessionStatus::Connected {
            return Ok(QrResult { api_key: api_key.to_owned(), status: SessionStatus::Connected, qr: None });
        }
        if let Some(qr) = managed.last_qr() {
            return Ok(QrResult { api_key: api_key.to_owned(), status: SessionStatus::Qr, qr: Some(qr) });
        }

        let (tx, rx) = oneshot::channel();
        managed.qr_waiters.lock().expect("qr waiters lock").push(tx);
        let qr_wait = Duration::from_secs(crate::config::get().qr_wait_seconds);
        match tokio::time::timeout(qr_wait, rx).await {
            Ok(Ok(Ok(qr))) => Ok(QrResult { api_key: api_key.to_owned(), status: SessionStatus::Qr, qr: Some(qr) }),
            Ok(Ok(Err(err))) => Err(err),
            Ok(Err(_)) => Err(GatewayError::internal(anyhow::anyhow!("QR waiter dropped"))),
            Err(_) => Err(GatewayError::internal(anyhow::anyhow!("QR code generation timeout"))),
        }
    }

    // ---- logout -----------------------------------------------------------

    pub async fn logout(&self, api_key: &str) -> GatewayResult<()> {
        wagate_data::keys::assert_active(api_key)?;
        let row = wagate_data::sessions::find_by_api_key(api_key)?.ok_or(GatewayError::SessionNotFound)?;

        if let Some(managed) = self.lookup_managed(api_key) {
            managed.cancel_reconnect_timer();
            let mut socket_guard = managed.socket.lock().await;
            if let Some(socket) = socket_guard.take() {
                if let Err(err) = socket.logout().await {
                    tracing::warn!(%api_key, error = %err, "upstream logout failed, closing anyway");
                }
                socket.close().await;
            }
        }

        wagate_data::credentials::clear_session_data(row.id)?;
        wagate_data::sessions::set_status(row.id, SessionStatus::LoggedOut)?;
        self.bus.publish_qr(api_key, None);
        self.bus.publish_status(&ConnectionInfo { api_key: api_key.to_owned(), status: SessionStatus::LoggedOut, connected: false });
        wagate_data::locks::release(api_key, &OWNER_ID)?;
        self.discard_managed(api_key);
        Ok(())
    }

    // ---- getConnectionStatus / getCurrentQr --------------------------------

    pub async fn get_connection_status(&self, api_key: &str) -> GatewayResult<ConnectionInfo> {
        wagate_data::keys::assert_active(api_key)?;
        let status = match self.lookup_managed(api_key) {
            Some(managed) => managed.status(),
            None => {
                let row = wagate_data::sessions::find_by_api_key(api_key)?.ok_or(GatewayError::SessionNotFound)?;
                row.status()
            }
        };
        let connected = match self.lookup_managed(api_key) {
            Some(managed) => managed.has_bound_user().await,
            None => false,
        };
        Ok(ConnectionInfo { api_key: api_key.to_owned(), status, connected })
    }

    pub fn get_current_qr(&self, api_key: &str) -> Option<String> {
        self.lookup_managed(api_key).and_then(|m| m.last_qr())
    }

    // ---- sendText -----------------------------------------------------------

    pub async fn send_text(&self, api_key: &str, to: &str, text: &str) -> GatewayResult<SendResult> {
        wagate_data::keys::assert_active(api_key)?;
        let row = wagate_data::sessions::find_by_api_key(api_key)?.ok_or(GatewayError::SessionNotFound)?;
        if row.status() == SessionStatus::LoggedOut {
            return Err(GatewayError::SessionLoggedOut);
        }

        let jid = msisdn::normalize_msisdn(to)?;
        msisdn::validate_text(text)?;

        let managed = self.initialize_socket(&row).await?;

        if !managed.holds_lock.load(Ordering::SeqCst) && !managed.has_bound_user().await {
            let owner = wagate_data::locks::get_owner(api_key)?.unwrap_or_else(|| "unknown".to_owned());
            return Err(GatewayError::SessionLocked { owner });
        }

        if !managed.has_bound_user().await {
            let (tx, rx) = oneshot::channel();
            managed.conn_waiters.lock().expect("conn waiters lock").push(tx);
            let connect_wait = Duration::from_secs(crate::config::get().connect_wait_seconds);
            match tokio::time::timeout(connect_wait, rx).await {
                Ok(Ok(Ok(()))) => {}
                _ => return Err(GatewayError::NotConnected),
            }
        }

        let message_id = {
            let socket_guard = managed.socket.lock().await;
            let socket = socket_guard.as_ref().ok_or(GatewayError::NotConnected)?;
            socket.send_text(&jid, text).await?
        };
        wagate_data::locks::touch(api_key, &OWNER_ID)?;
        Ok(SendResult { message_id })
    }

    // ---- warmSessions -------------------------------------------------------

    pub async fn warm_sessions(&self) -> GatewayResult<WarmupReport> {
        let candidates = wagate_data::sessions::list_warmup_candidates()?;
        let total = candidates.len();
        let mut attempted = 0usize;
        let mut connected = 0usize;
        let mut failed = 0usize;

        for row in candidates {
            attempted += 1;
            match self.initialize_socket(&row).await {
                Ok(managed) => {
                    let warmup_wait = Duration::from_secs(crate::config::get().warmup_wait_seconds);
                    let became_connected = tokio::time::timeout(warmup_wait, async {
                        loop {
                            if managed.status() == SessionStatus::Connected {
                                return true;
                            }
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    })
                    .await
                    .unwrap_or(false);
                    if became_connected {
                        connected += 1;
                    }
                }
                Err(err) => {
                    tracing::warn!(api_key = %row.api_key, error = %err, "warm-up failed for session");
                    failed += 1;
                }
            }
        }

        Ok(WarmupReport { total, attempted, connected, failed })
    }

    // ---- initializeSocket ---------------------------------------------------

    async fn initialize_socket(&self, row: &DbSession) -> GatewayResult<Arc<ManagedSession>> {
        let managed = self.get_or_create_managed(row);

        if managed.has_socket().await {
            return Ok(managed);
        }

        let _gate = managed.connect_gate.lock().await;
        if managed.has_socket().await {
            return Ok(managed);
        }

        if !wagate_data::locks::acquire(&row.api_key, &OWNER_ID, LOCK_TTL_SECONDS)? {
            // Another process owns this session; caller treats the returned
            // ManagedSession (socket-less) as "not ours".
            return Ok(managed);
        }
        managed.holds_lock.store(true, Ordering::SeqCst);

        managed.set_status(SessionStatus::Connecting);
        wagate_data::sessions::set_status(row.id, SessionStatus::Connecting).ok();

        match self.build_socket(&managed, row.id).await {
            Ok(()) => Ok(managed),
            Err(err) => {
                managed.set_status(SessionStatus::Error);
                wagate_data::sessions::set_status(row.id, SessionStatus::Error).ok();
                for waiter in managed.drain_qr_waiters() {
                    let _ = waiter.send(Err(GatewayError::internal(anyhow::anyhow!("{err}"))));
                }
                wagate_data::locks::release(&row.api_key, &OWNER_ID).ok();
                managed.holds_lock.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    async fn build_socket(&self, managed: &Arc<ManagedSession>, session_id: i64) -> GatewayResult<()> {
        let creds = match wagate_data::credentials::load_creds(session_id)? {
            Some(creds) => creds,
            None => {
                let creds = self.adapter.init_auth_creds();
                wagate_data::credentials::save_creds(session_id, &creds)?;
                creds
            }
        };
        let version = self.adapter.fetch_version().await;

        let key_reader: Arc<dyn KeyReader> = Arc::new(StoreKeys { session_id });
        let key_writer: Arc<dyn KeyWriter> = Arc::new(StoreKeys { session_id });
        let mut socket = self
            .adapter
            .new_socket(SocketOptions { api_key: managed.api_key.clone(), auth_creds: creds, version }, key_reader, key_writer)
            .await?;

        let mut conn_updates = socket.connection_update();
        let mut creds_updates = socket.creds_update();
        *managed.socket.lock().await = Some(socket);

        let this = self.clone();
        let managed_for_updates = managed.clone();
        tokio::spawn(async move {
            while let Some(update) = conn_updates.recv().await {
                this.handle_connection_update(&managed_for_updates, update).await;
            }
        });

        let managed_for_creds = managed.clone();
        tokio::spawn(async move {
            while let Some(creds) = creds_updates.recv().await {
                if let Err(err) = wagate_data::credentials::save_creds(managed_for_creds.session_id, &creds) {
                    tracing::warn!(api_key = %managed_for_creds.api_key, error = %err, "failed to persist rotated credentials");
                }
            }
        });

        Ok(())
    }

    // ---- connection-update handler -------------------------------------------

    async fn handle_connection_update(&self, managed: &Arc<ManagedSession>, update: ConnectionUpdate) {
        if let Some(qr) = &update.qr {
            *managed.last_qr.lock().expect("qr lock") = Some(qr.clone());
            self.bus.publish_qr(&managed.api_key, Some(qr.clone()));
            managed.set_status(SessionStatus::Qr);
            wagate_data::sessions::set_status(managed.session_id, SessionStatus::Qr).ok();
            for waiter in managed.drain_qr_waiters() {
                let _ = waiter.send(Ok(qr.clone()));
            }
        }

        match update.connection {
            Some(Connection::Open) => {
                *managed.last_qr.lock().expect("qr lock") = None;
                self.bus.publish_qr(&managed.api_key, None);
                managed.set_status(SessionStatus::Connected);
                wagate_data::sessions::set_status(managed.session_id, SessionStatus::Connected).ok();
                managed.cancel_reconnect_timer();
                for waiter in managed.drain_conn_waiters() {
                    let _ = waiter.send(Ok(()));
                }
                RECONNECT_ATTEMPTS.write().expect("reconnect attempts lock").remove(&managed.api_key);
                wagate_data::locks::touch(&managed.api_key, &OWNER_ID).ok();
                self.bus.publish_status(&ConnectionInfo {
                    api_key: managed.api_key.clone(),
                    status: SessionStatus::Connected,
                    connected: true,
                });
            }
            Some(Connection::Close) => {
                managed.cancel_reconnect_timer();
                if let Some(socket) = managed.socket.lock().await.take() {
                    socket.close().await;
                }

                if update.is_logged_out() {
                    wagate_data::credentials::clear_session_data(managed.session_id).ok();
                    wagate_data::sessions::set_status(managed.session_id, SessionStatus::LoggedOut).ok();
                    managed.set_status(SessionStatus::LoggedOut);
                    wagate_data::locks::release(&managed.api_key, &OWNER_ID).ok();
                    self.discard_managed(&managed.api_key);
                } else {
                    managed.set_status(SessionStatus::Disconnected);
                    wagate_data::sessions::set_status(managed.session_id, SessionStatus::Disconnected).ok();
                    self.schedule_reconnect(managed.clone());
                }

                let closed_err = || GatewayError::internal(anyhow::anyhow!("WhatsApp connection closed"));
                for waiter in managed.drain_qr_waiters() {
                    let _ = waiter.send(Err(closed_err()));
                }
                for waiter in managed.drain_conn_waiters() {
                    let _ = waiter.send(Err(closed_err()));
                }

                self.bus.publish_status(&ConnectionInfo {
                    api_key: managed.api_key.clone(),
                    status: managed.status(),
                    connected: false,
                });
            }
            _ => {}
        }
    }

    // ---- shutdown -----------------------------------------------------------

    /// Force-closes every live socket this process holds, without attempting
    /// a graceful upstream logout (that would leave the session paired; a
    /// restart should simply reconnect it).
    pub async fn close_all_sockets(&self) {
        let managed: Vec<Arc<ManagedSession>> = MANAGED_SESSIONS
            .read()
            .expect("managed sessions lock")
            .values()
            .cloned()
            .collect();
        for session in managed {
            session.cancel_reconnect_timer();
            if let Some(socket) = session.socket.lock().await.take() {
                socket.close().await;
            }
        }
    }

    fn schedule_reconnect(&self, managed: Arc<ManagedSession>) {
        if global::is_shutting_down() {
            return;
        }
        let attempt = {
            let mut attempts = RECONNECT_ATTEMPTS.write().expect("reconnect attempts lock");
            let counter = attempts.entry(managed.api_key.clone()).or_insert(0);
            *counter += 1;
            *counter
        };
        let delay = Duration::from_millis(reconnect_delay_ms(attempt));

        let this = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if managed.has_socket().await || global::is_shutting_down() {
                return;
            }
            if let Ok(Some(row)) = wagate_data::sessions::find_by_api_key(&managed.api_key) {
                if let Err(err) = this.initialize_socket(&row).await {
                    tracing::warn!(api_key = %managed.api_key, error = %err, "reconnect attempt failed");
                }
            }
        });
        *managed.reconnect_task.lock().expect("reconnect task lock") = Some(handle);
    }
}

/// Binds the Credential Store's key-level read/write ops to the upstream
/// library's `keys.get`/`keys.set` callback shape.
struct StoreKeys {
    session_id: i64,
}

#[async_trait::async_trait]
impl KeyReader for StoreKeys {
    async fn get(&self, key_type: &str, ids: &[String]) -> GatewayResult<Vec<(String, Option<serde_json::Value>)>> {
        let loaded = wagate_data::credentials::load_keys(self.session_id, key_type, ids)?;
        Ok(ids.iter().map(|id| (id.clone(), loaded.get(id).cloned().flatten())).collect())
    }
}

#[async_trait::async_trait]
impl KeyWriter for StoreKeys {
    async fn set(&self, key_type: &str, values: Vec<(String, Option<serde_json::Value>)>) -> GatewayResult<()> {
        let mut by_type: HashMap<String, HashMap<String, Option<serde_json::Value>>> = HashMap::new();
        by_type.insert(key_type.to_owned(), values.into_iter().collect());
        wagate_data::credentials::set_keys(self.session_id, &by_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_delay_doubles_until_the_cap() {
        assert!((1000..1500).contains(&reconnect_delay_ms(1)));
        assert!((2000..2500).contains(&reconnect_delay_ms(2)));
        assert!((4000..4500).contains(&reconnect_delay_ms(3)));
    }

    #[test]
    fn reconnect_delay_never_exceeds_cap_plus_jitter() {
        for n in 1..=20u32 {
            let delay = reconnect_delay_ms(n);
            assert!(delay >= RECONNECT_CAP_MS.min(1000));
            assert!(delay <= RECONNECT_CAP_MS + RECONNECT_JITTER_MS);
        }
    }
}

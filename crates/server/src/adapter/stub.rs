//! A stub [`UpstreamAdapter`] that synthesises a QR payload, waits to be
//! told a phone scanned it, and otherwise behaves like a single-socket
//! WhatsApp Web connection: load-or-pair, emit `Event::Qr` when no session
//! exists yet, then `Event::Connected` once paired.
//!
//! Test code drives the fake phone side through [`StubAdapter::inject`]:
//! scripted `open`/`close`/logout events keyed by the socket's API key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use wagate_core::adapter::{
    Connection, ConnectionUpdate, KeyReader, KeyWriter, SocketOptions, UpstreamAdapter, UpstreamSocket,
};
use wagate_core::error::GatewayResult;
use wagate_core::types::Creds;

const QR_EMIT_DELAY: Duration = Duration::from_millis(20);

struct Controller {
    tx: mpsc::Sender<ConnectionUpdate>,
    bound_user: Arc<AtomicBool>,
}

/// Registry of live stub sockets, keyed by the label each socket was built
/// with (in practice the tenant's API key), so test code can reach into a
/// socket it does not itself hold a handle to.
#[derive(Clone, Default)]
pub struct StubAdapter {
    controllers: Arc<Mutex<HashMap<String, Controller>>>,
}

impl StubAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a scripted `ConnectionUpdate` to the named socket, as if it
    /// came from the real upstream library. No-op if the socket is gone.
    /// Updates the socket's own `hasBoundUser` bit the same way a real
    /// client would learn of open/close before notifying its listeners.
    pub async fn inject(&self, label: &str, update: ConnectionUpdate) {
        let controller = {
            let controllers = self.controllers.lock().expect("stub controller lock");
            controllers.get(label).map(|c| (c.tx.clone(), c.bound_user.clone()))
        };
        let Some((tx, bound_user)) = controller else { return };
        match update.connection {
            Some(Connection::Open) => bound_user.store(true, Ordering::SeqCst),
            Some(Connection::Close) => bound_user.store(false, Ordering::SeqCst),
            _ => {}
        }
        let _ = tx.send(update).await;
    }

    fn register(&self, label: String, tx: mpsc::Sender<ConnectionUpdate>, bound_user: Arc<AtomicBool>) {
        self.controllers.lock().expect("stub controller lock").insert(label, Controller { tx, bound_user });
    }

    fn unregister(&self, label: &str) {
        self.controllers.lock().expect("stub controller lock").remove(label);
    }
}

#[async_trait]
impl UpstreamAdapter for StubAdapter {
    async fn new_socket(
        &self,
        options: SocketOptions,
        _keys: Arc<dyn KeyReader>,
        _key_writer: Arc<dyn KeyWriter>,
    ) -> GatewayResult<Box<dyn UpstreamSocket>> {
        let label = options.api_key.clone();
        let (update_tx, update_rx) = mpsc::channel(16);
        let (creds_tx, creds_rx) = mpsc::channel(4);
        let bound_user = Arc::new(AtomicBool::new(false));

        self.register(label.clone(), update_tx.clone(), bound_user.clone());

        // Nobody has paired yet: synthesise a QR shortly after construction,
        // mirroring a real client's immediate Event::Qr when no session exists.
        tokio::spawn({
            let update_tx = update_tx.clone();
            async move {
                tokio::time::sleep(QR_EMIT_DELAY).await;
                let _ = update_tx
                    .send(ConnectionUpdate {
                        connection: Some(Connection::Connecting),
                        qr: Some(format!("stub-qr-{}", fastrand_hex())),
                        last_disconnect_status_code: None,
                    })
                    .await;
            }
        });

        Ok(Box::new(StubSocket {
            label,
            adapter: self.clone(),
            update_rx: Some(update_rx),
            creds_rx: Some(creds_rx),
            creds_tx,
            bound_user,
        }))
    }

    async fn fetch_version(&self) -> (u16, u16, u16) {
        (2, 3000, 0)
    }

    fn init_auth_creds(&self) -> Creds {
        Creds {
            registration_id: rand::random::<u16>() as u32,
            ..Default::default()
        }
    }
}

fn fastrand_hex() -> String {
    use rand::RngCore;
    let mut buf = [0u8; 4];
    rand::rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{b:02x}")).collect()
}

struct StubSocket {
    label: String,
    adapter: StubAdapter,
    update_rx: Option<mpsc::Receiver<ConnectionUpdate>>,
    creds_rx: Option<mpsc::Receiver<Creds>>,
    #[allow(dead_code)]
    creds_tx: mpsc::Sender<Creds>,
    bound_user: Arc<AtomicBool>,
}

#[async_trait]
impl UpstreamSocket for StubSocket {
    fn creds_update(&mut self) -> mpsc::Receiver<Creds> {
        self.creds_rx.take().expect("creds_update subscribed twice")
    }

    fn connection_update(&mut self) -> mpsc::Receiver<ConnectionUpdate> {
        self.update_rx.take().expect("connection_update subscribed twice")
    }

    async fn send_text(&self, _jid: &str, _text: &str) -> GatewayResult<String> {
        Ok(format!("stub-msg-{}", fastrand_hex()))
    }

    async fn logout(&self) -> GatewayResult<()> {
        Ok(())
    }

    async fn close(&self) {
        self.bound_user.store(false, std::sync::atomic::Ordering::SeqCst);
        self.adapter.unregister(&self.label);
    }

    fn has_bound_user(&self) -> bool {
        self.bound_user.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullKeys;
    #[async_trait]
    impl KeyReader for NullKeys {
        async fn get(&self, _key_type: &str, ids: &[String]) -> GatewayResult<Vec<(String, Option<serde_json::Value>)>> {
            Ok(ids.iter().map(|id| (id.clone(), None)).collect())
        }
    }
    #[async_trait]
    impl KeyWriter for NullKeys {
        async fn set(&self, _key_type: &str, _values: Vec<(String, Option<serde_json::Value>)>) -> GatewayResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn emits_a_qr_shortly_after_construction() {
        let adapter = StubAdapter::new();
        let creds = adapter.init_auth_creds();
        let mut socket = adapter
            .new_socket(
                SocketOptions { api_key: "k1".to_owned(), auth_creds: creds, version: (2, 3000, 0) },
                Arc::new(NullKeys),
                Arc::new(NullKeys),
            )
            .await
            .expect("socket construction");

        let mut updates = socket.connection_update();
        let update = tokio::time::timeout(Duration::from_millis(500), updates.recv())
            .await
            .expect("qr should arrive")
            .expect("channel open");
        assert!(update.qr.is_some());
    }

    #[tokio::test]
    async fn injected_close_carries_the_logged_out_sentinel() {
        let adapter = StubAdapter::new();
        let creds = adapter.init_auth_creds();
        let label = "k1";
        let mut socket = adapter
            .new_socket(
                SocketOptions { api_key: label.to_owned(), auth_creds: creds, version: (2, 3000, 0) },
                Arc::new(NullKeys),
                Arc::new(NullKeys),
            )
            .await
            .expect("socket construction");
        let mut updates = socket.connection_update();
        let _ = updates.recv().await; // drain the synthesised qr

        adapter
            .inject(
                label,
                ConnectionUpdate {
                    connection: Some(Connection::Close),
                    qr: None,
                    last_disconnect_status_code: Some(wagate_core::adapter::LOGGED_OUT_STATUS_CODE),
                },
            )
            .await;

        let update = tokio::time::timeout(Duration::from_millis(500), updates.recv())
            .await
            .expect("close should arrive")
            .expect("channel open");
        assert!(update.is_logged_out());
    }
}

//! Event Bus: per-tenant publish/subscribe of status and QR events with
//! heartbeats. One instance, process-wide; modelled as a map from `apiKey`
//! to a set of subscriber channels, the same registry-of-channels shape as
//! a session-keyed SSE fan-out.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;

use salvo::sse::SseEvent;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use wagate_core::types::ConnectionInfo;

const CHANNEL_CAPACITY: usize = 32;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<SseEvent>,
}

#[derive(Default)]
struct Registry {
    by_key: HashMap<String, Vec<Subscriber>>,
    next_id: u64,
}

pub struct EventBus {
    registry: Mutex<Registry>,
}

pub static EVENT_BUS: LazyLock<Arc<EventBus>> = LazyLock::new(|| Arc::new(EventBus::new()));

impl EventBus {
    fn new() -> Self {
        Self { registry: Mutex::new(Registry::default()) }
    }

    /// Registers a new subscriber, optionally pushing an initial `status`
    /// and a buffered `qr` event so a fresh SSE client catches up
    /// immediately.
    pub fn subscribe(
        &self,
        api_key: &str,
        initial_status: Option<ConnectionInfo>,
        initial_qr: Option<String>,
    ) -> ReceiverStream<SseEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        if let Some(status) = &initial_status {
            let _ = tx.try_send(status_event(status));
        }
        if let Some(qr) = &initial_qr {
            let _ = tx.try_send(qr_event(api_key, Some(qr.clone())));
        }
        // Flush headers immediately; real events may be seconds away.
        let _ = tx.try_send(SseEvent::default().comment("connected"));

        let mut registry = self.registry.lock().expect("event bus lock");
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .by_key
            .entry(api_key.to_owned())
            .or_default()
            .push(Subscriber { id, tx });

        ReceiverStream::new(rx)
    }

    pub fn publish_status(&self, info: &ConnectionInfo) {
        self.broadcast(&info.api_key, status_event(info));
    }

    pub fn publish_qr(&self, api_key: &str, qr: Option<String>) {
        self.broadcast(api_key, qr_event(api_key, qr));
    }

    fn broadcast(&self, api_key: &str, event: SseEvent) {
        let mut registry = self.registry.lock().expect("event bus lock");
        if let Some(subs) = registry.by_key.get_mut(api_key) {
            subs.retain(|sub| sub.tx.try_send(event.clone()).is_ok());
            if subs.is_empty() {
                registry.by_key.remove(api_key);
            }
        }
    }

    /// Writes a comment frame to every live subscriber; a send failure
    /// means the transport is no longer writable, so the subscriber is
    /// dropped on the spot rather than waited on.
    fn heartbeat(&self) {
        let mut registry = self.registry.lock().expect("event bus lock");
        registry.by_key.retain(|_api_key, subs| {
            subs.retain(|sub| sub.tx.try_send(SseEvent::default().comment("keep-alive")).is_ok());
            !subs.is_empty()
        });
    }
}

fn status_event(info: &ConnectionInfo) -> SseEvent {
    SseEvent::default()
        .name("status")
        .json_data(info)
        .unwrap_or_else(|_| SseEvent::default().name("status"))
}

fn qr_event(api_key: &str, qr: Option<String>) -> SseEvent {
    SseEvent::default()
        .name("qr")
        .json_data(serde_json::json!({ "apiKey": api_key, "qr": qr }))
        .unwrap_or_else(|_| SseEvent::default().name("qr"))
}

/// Spawns the process-wide heartbeat timer; call once at startup.
pub fn spawn_heartbeat(bus: Arc<EventBus>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            ticker.tick().await;
            bus.heartbeat();
        }
    });
}

/// Subscriber id type kept around for documentation purposes; dead
/// subscribers are pruned structurally (by send failure), not by id.
#[allow(dead_code)]
type SubscriberId = u64;

#[cfg(test)]
mod tests {
    use super::*;
    use wagate_core::types::SessionStatus;

    #[tokio::test]
    async fn a_dead_subscriber_is_pruned_on_the_next_publish() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe("k1", None, None);
        // drain the initial comment frame
        use futures_util::StreamExt as _;
        let _ = stream.next().await;
        drop(stream);

        bus.publish_status(&ConnectionInfo {
            api_key: "k1".into(),
            status: SessionStatus::Connected,
            connected: true,
        });

        let registry = bus.registry.lock().unwrap();
        assert!(!registry.by_key.contains_key("k1"));
    }
}

//! Process-wide state. The ManagedSession map is deliberately global:
//! correctness across processes comes from the durable Session Lock, not
//! from shared memory, but within one process every Supervisor entry point
//! must see the same map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, RwLock};

use crate::supervisor::ManagedSession;

pub type LazyRwLock<T> = LazyLock<RwLock<T>>;

/// `"<hostname>-<pid>"`, generated once at boot; the Session Lock's owner
/// identity.
pub static OWNER_ID: LazyLock<String> = LazyLock::new(|| {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown-host".to_owned());
    format!("{host}-{}", std::process::id())
});

pub static MANAGED_SESSIONS: LazyRwLock<HashMap<String, Arc<ManagedSession>>> = LazyLock::new(Default::default);

/// Per-key reconnect attempt counters, feeding [`crate::supervisor::reconnect_delay_ms`].
pub static RECONNECT_ATTEMPTS: LazyRwLock<HashMap<String, u32>> = LazyLock::new(Default::default);

/// Flipped once on SIGINT/SIGTERM; lets in-flight loops notice shutdown
/// without plumbing a cancellation token through every call site.
pub static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);

pub fn is_shutting_down() -> bool {
    SHUTTING_DOWN.load(Ordering::Relaxed)
}

pub fn begin_shutdown() {
    SHUTTING_DOWN.store(true, Ordering::Relaxed);
}

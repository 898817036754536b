//! Upstream Adapter implementations. No crate on the public registry speaks
//! the real WhatsApp Web multi-device protocol, so [`stub`] is the full
//! extent of this integration in this workspace; a production deployment
//! swaps it for one backed by a real client without touching the
//! Supervisor.

pub mod stub;

//! The HTTP shell, Session Supervisor, and SSE fan-out for the WhatsApp
//! session gateway. Binary entry point lives in `main.rs`; this library
//! exposes the pieces the binary wires together so integration tests can
//! build the same router without a `main`.

pub mod adapter;
pub mod config;
pub mod event_bus;
pub mod global;
pub mod hoops;
pub mod routing;
pub mod signal;
pub mod supervisor;

pub use event_bus::EventBus;
pub use supervisor::Supervisor;

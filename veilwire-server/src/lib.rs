//! # veilwire-server
//!
//! The veilwire messaging endpoint. Clients connect over TCP, negotiate a
//! per-connection AES-256-GCM session key through a Diffie–Hellman
//! exchange, then trade length-framed sealed packages carrying a
//! transaction code and a JSON payload. Requests are dispatched by code to
//! the application handlers; state persists in the encrypted-at-rest
//! store from `veilwire-store`.
//!
//! Pipeline per frame:
//!
//! ```text
//! socket → frame codec → session sealer (open) → dispatcher → handler
//!        ← frame codec ← session sealer (seal) ← dispatcher ←
//! ```
//!
//! The handshake is deliberately unauthenticated at the transport layer;
//! clients prove identity with session tokens once connected.

#![deny(unsafe_code)]

pub mod codec;
pub mod config;
mod connection;
pub mod dispatch;
pub mod exit_codes;
mod handlers;
pub mod handshake;
pub mod server;
pub mod storage;
pub mod version;

pub use config::Config;
pub use dispatch::Dispatcher;
pub use server::TcpEndpoint;
pub use storage::AppStorage;

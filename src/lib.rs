//! Tunnelgate - a gateway for backends that don't exist yet
//!
//! This library exposes a stable set of URL prefixes whose backends are
//! provisioned on demand behind an SSH-style tunnel:
//! - Routes (host, path) lookups to backends by longest prefix match
//! - Fetches unknown routes from an external lookup service, deduplicating
//!   concurrent requests for the same key
//! - Drives each backend through its connection lifecycle (provisioning
//!   wait, tunnel connect with retry, bootstrap, backend-ready wait)
//! - Queues connection requests until the backend is ready and serves them
//!   in FIFO order
//! - Publishes a replayable per-backend progress event stream for
//!   provisioning UIs
//! - Detects broken tunnel sessions and reconnects without dropping queued
//!   requests

pub mod backend;
pub mod config;
pub mod error;
pub mod establish;
pub mod lookup;
pub mod progress;
pub mod registry;
pub mod signer;
pub mod transport;
pub mod watchdog;

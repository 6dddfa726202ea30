//! lynx-sync - keeps WireGuard VPN client profiles on lightly loaded servers
//!
//! For every desired country (and optionally a "quick" best-overall
//! profile) the tool asks the server directory for a recommended server,
//! compares it with the profile persisted on disk and with the live
//! interface, and only rewrites the profile when it is missing or its
//! bound server has become overloaded.
//!
//! # Architecture
//!
//! - `config`: Configuration file handling (TOML)
//! - `catalog`: Server directory API client
//! - `profile`: Profile data model and on-disk store
//! - `reconcile`: Create / update / repair / no-op decisions
//! - `platform`: WireGuard interface control (Linux)
//! - `events`: Change notifications over Redis
//! - `orchestrator`: Runs a reconciliation pass per profile
//!
//! # Usage
//!
//! ```bash
//! lynx-sync init      # write lynx-sync.toml, then set private_key
//! sudo lynx-sync sync
//! ```

pub mod catalog;
pub mod config;
pub mod events;
pub mod orchestrator;
pub mod platform;
pub mod profile;
pub mod reconcile;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use orchestrator::{Orchestrator, RunOptions, RunSummary};
pub use reconcile::{ReconciliationAction, ReconciliationEngine};

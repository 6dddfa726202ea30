//! Server directory access
//!
//! The directory is a remote data source: it lists supported countries,
//! recommends servers per country along with their load, and reports the
//! current load of a named server. `NordCatalog` talks to the HTTP API;
//! the reconciliation code only depends on the `ServerCatalog` trait.

pub mod nord;

use crate::profile::{CandidateServer, QUICK_COUNTRY_ID};
use serde::Deserialize;
use std::future::Future;
use std::net::Ipv4Addr;
use thiserror::Error;

pub use nord::NordCatalog;

#[derive(Error, Debug, Clone)]
pub enum CatalogError {
    #[error("Server directory unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("No recommended server for country id {0}")]
    NoCandidateFound(u32),
    #[error("Unknown country: {0}")]
    UnknownCountry(String),
    #[error("Invalid directory response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Country {
    pub id: u32,
    pub name: String,
}

/// Read-only view of the remote server directory
pub trait ServerCatalog {
    fn list_countries(&self) -> impl Future<Output = Result<Vec<Country>, CatalogError>> + Send;

    /// Best server for `country_id` (0 = best across all countries) among
    /// at most `limit` recommendations
    fn recommend_server(
        &self,
        country_id: u32,
        limit: u32,
    ) -> impl Future<Output = Result<CandidateServer, CatalogError>> + Send;

    /// Current load of an already known server
    fn server_load(&self, hostname: &str) -> impl Future<Output = Result<f64, CatalogError>> + Send;
}

/// Look up a country id by its exact directory name
pub fn resolve_country(countries: &[Country], name: &str) -> Result<u32, CatalogError> {
    countries
        .iter()
        .find(|c| c.name == name)
        .map(|c| c.id)
        .ok_or_else(|| CatalogError::UnknownCountry(name.to_string()))
}

/// Pick the least loaded entry; the first one wins on ties
pub fn least_loaded<T>(entries: &[T], load: impl Fn(&T) -> f64) -> Option<&T> {
    entries.iter().min_by(|a, b| load(a).total_cmp(&load(b)))
}

/// Local tunnel address assignment
///
/// Each profile gets `base + country_id`; the quick profile uses a fixed
/// host. Two countries never share an address, but a country whose id
/// equals `quick_host` collides with the quick profile.
///
/// Ids from 255 onward leave the first /24 and carry into the next octet,
/// so id 255 yields the broadcast address of `10.5.0.0/24` and id 256 the
/// network address `10.5.1.0/24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressPolicy {
    pub base: Ipv4Addr,
    pub prefix_len: u8,
    pub quick_host: u32,
}

impl Default for AddressPolicy {
    fn default() -> Self {
        Self {
            base: Ipv4Addr::new(10, 5, 0, 0),
            prefix_len: 24,
            quick_host: 5,
        }
    }
}

impl AddressPolicy {
    pub fn address_for(&self, country_id: u32) -> String {
        let host = if country_id == QUICK_COUNTRY_ID {
            self.quick_host
        } else {
            country_id
        };
        let ip = Ipv4Addr::from(u32::from(self.base).wrapping_add(host));
        format!("{}/{}", ip, self.prefix_len)
    }
}

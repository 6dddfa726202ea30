//! In-memory collaborators shared by unit tests

use crate::catalog::{CatalogError, Country, ServerCatalog};
use crate::events::{EventPublisher, PublishError};
use crate::platform::{InterfaceDriver, InterfaceProbe, PlatformError};
use crate::profile::{CandidateServer, ChangeEvent, ProfileId, TunnelProfile};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

pub fn server(hostname: &str, country_id: u32, load: f64) -> CandidateServer {
    CandidateServer {
        hostname: hostname.to_string(),
        station: format!("192.0.2.{}", country_id % 250 + 1),
        public_key: format!("{}-key", hostname),
        country_id,
        country_name: "Testland".to_string(),
        city_name: "Testville".to_string(),
        load,
    }
}

#[derive(Default)]
pub struct FakeCatalog {
    pub countries: Vec<Country>,
    pub recommendations: HashMap<u32, CandidateServer>,
    pub loads: HashMap<String, f64>,
    pub unavailable: HashSet<u32>,
    pub load_queries: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub fn with_country(mut self, id: u32, name: &str) -> Self {
        self.countries.push(Country {
            id,
            name: name.to_string(),
        });
        self
    }

    pub fn recommending(mut self, candidate: CandidateServer) -> Self {
        self.recommendations.insert(candidate.country_id, candidate);
        self
    }

    pub fn with_load(mut self, hostname: &str, load: f64) -> Self {
        self.loads.insert(hostname.to_string(), load);
        self
    }

    pub fn failing_for(mut self, country_id: u32) -> Self {
        self.unavailable.insert(country_id);
        self
    }

    pub fn load_queries(&self) -> Vec<String> {
        self.load_queries.lock().unwrap().clone()
    }
}

impl ServerCatalog for FakeCatalog {
    async fn list_countries(&self) -> Result<Vec<Country>, CatalogError> {
        Ok(self.countries.clone())
    }

    async fn recommend_server(&self, country_id: u32, _limit: u32) -> Result<CandidateServer, CatalogError> {
        if self.unavailable.contains(&country_id) {
            return Err(CatalogError::UpstreamUnavailable("connection reset".to_string()));
        }
        self.recommendations
            .get(&country_id)
            .cloned()
            .ok_or(CatalogError::NoCandidateFound(country_id))
    }

    async fn server_load(&self, hostname: &str) -> Result<f64, CatalogError> {
        self.load_queries.lock().unwrap().push(hostname.to_string());
        self.loads
            .get(hostname)
            .copied()
            .ok_or_else(|| CatalogError::UpstreamUnavailable(format!("no stats for {}", hostname)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Create(String, Vec<String>),
    Apply(String, String),
}

fn first_endpoint(profile: &TunnelProfile) -> String {
    profile.peers.first().map(|p| p.endpoint.clone()).unwrap_or_default()
}

/// (public key, endpoint) of the first peer
fn first_peer(profile: &TunnelProfile) -> Option<(String, String)> {
    profile
        .peers
        .first()
        .map(|p| (p.public_key.clone(), p.endpoint.clone()))
}

#[derive(Default)]
pub struct FakeDriver {
    pub live: Mutex<HashSet<String>>,
    /// First peer of the last successful apply, per interface
    pub applied: Mutex<HashMap<String, Option<(String, String)>>>,
    pub calls: Mutex<Vec<DriverCall>>,
    pub fail_apply: AtomicBool,
    /// Profile directory checked for a settings document on every create
    pub profile_dir: Option<PathBuf>,
    pub persisted_at_create: Mutex<Vec<bool>>,
}

impl FakeDriver {
    /// Interface already up and configured with `profile`
    pub fn with_live(self, id: &ProfileId, profile: &TunnelProfile) -> Self {
        self.live.lock().unwrap().insert(id.to_string());
        self.applied
            .lock()
            .unwrap()
            .insert(id.to_string(), first_peer(profile));
        self
    }

    pub fn applied_peer(&self, id: &ProfileId) -> Option<(String, String)> {
        self.applied.lock().unwrap().get(id.as_str()).cloned().flatten()
    }

    pub fn failing_apply(self) -> Self {
        self.set_fail_apply(true);
        self
    }

    pub fn set_fail_apply(&self, fail: bool) {
        self.fail_apply.store(fail, Ordering::SeqCst);
    }

    pub fn watching(mut self, profile_dir: PathBuf) -> Self {
        self.profile_dir = Some(profile_dir);
        self
    }

    pub fn persisted_at_create(&self) -> Vec<bool> {
        self.persisted_at_create.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl InterfaceProbe for FakeDriver {
    fn exists(&self, id: &ProfileId) -> bool {
        self.live.lock().unwrap().contains(id.as_str())
    }

    fn is_configured(&self, id: &ProfileId, profile: &TunnelProfile) -> bool {
        self.exists(id)
            && self.applied.lock().unwrap().get(id.as_str()) == Some(&first_peer(profile))
    }
}

impl InterfaceDriver for FakeDriver {
    fn create_interface(&self, id: &ProfileId, addresses: &[String]) -> Result<(), PlatformError> {
        if let Some(dir) = &self.profile_dir {
            let persisted = dir.join(format!("{}.settings", id)).exists()
                && dir.join(format!("{}.json", id)).exists();
            self.persisted_at_create.lock().unwrap().push(persisted);
        }
        self.calls
            .lock()
            .unwrap()
            .push(DriverCall::Create(id.to_string(), addresses.to_vec()));
        self.live.lock().unwrap().insert(id.to_string());
        Ok(())
    }

    fn apply_peer_config(&self, id: &ProfileId, profile: &TunnelProfile) -> Result<(), PlatformError> {
        let endpoint = first_endpoint(profile);
        self.calls
            .lock()
            .unwrap()
            .push(DriverCall::Apply(id.to_string(), endpoint));
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(PlatformError::InterfaceCommandError {
                command: "wg syncconf".to_string(),
                message: "Operation not permitted".to_string(),
            });
        }
        self.applied
            .lock()
            .unwrap()
            .insert(id.to_string(), first_peer(profile));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<ChangeEvent>>,
    pub fail: bool,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: &ChangeEvent) -> Result<(), PublishError> {
        self.events.lock().unwrap().push(event.clone());
        if self.fail {
            return Err(PublishError::Send {
                channel: "TO.FireMain".to_string(),
                message: "Could not connect to Redis".to_string(),
            });
        }
        Ok(())
    }
}

//! Reconciliation engine
//!
//! Decides, for one profile, whether the persisted configuration must be
//! created, moved to a new server, left alone, or only have its live
//! interface rebuilt. Inputs are a freshly recommended candidate, the
//! persisted profile (if any) and whether the live interface exists and
//! carries the persisted peers.
//!
//! Rules, in order:
//! 1. No persisted profile: create it from the candidate.
//! 2. Interface missing or out of date: rebuild it from the persisted
//!    profile, never switching servers because of it.
//! 3. Already bound to the candidate: nothing to do.
//! 4. Bound elsewhere: query the bound server's current load and switch
//!    only when it is above the threshold *and* above the candidate's load.
//!
//! The engine never touches disk, interfaces or the message bus itself;
//! the orchestrator applies the returned [`Reconciliation`].

use crate::catalog::{AddressPolicy, CatalogError, ServerCatalog};
use crate::config::Config;
use crate::profile::{
    CandidateServer, ChangeEvent, PersistedSettings, ProfileId, StoredProfile, TunnelProfile,
};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconciliationAction {
    NoOp,
    Create,
    Update,
    InterfaceRepairOnly,
}

impl ReconciliationAction {
    /// Whether the persisted documents must be written
    pub fn persists(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }

    /// Whether the live interface must be (re)configured
    pub fn touches_interface(self) -> bool {
        !matches!(self, Self::NoOp)
    }
}

/// Verdict for an already persisted profile, before any load comparison
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assessment {
    RepairInterface,
    AlreadyBound,
    CompareLoad { bound_server: String },
}

pub fn assess(
    candidate: &CandidateServer,
    existing: &StoredProfile,
    interface_ready: bool,
) -> Assessment {
    if !interface_ready {
        return Assessment::RepairInterface;
    }
    if existing.settings.server_name == candidate.hostname {
        return Assessment::AlreadyBound;
    }
    Assessment::CompareLoad {
        bound_server: existing.settings.server_name.clone(),
    }
}

/// Move only when the bound server is both over the threshold and worse
/// than the alternative
pub fn should_switch(bound_load: f64, candidate_load: f64, threshold: f64) -> bool {
    bound_load > threshold && bound_load > candidate_load
}

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub action: ReconciliationAction,
    pub settings: PersistedSettings,
    pub tunnel: TunnelProfile,
    pub event: Option<ChangeEvent>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_load: f64,
    pub private_key: String,
    pub origin: String,
    pub addresses: AddressPolicy,
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            max_load: config.max_load,
            private_key: config.private_key.clone(),
            origin: config.events.origin.clone(),
            addresses: AddressPolicy::default(),
        }
    }
}

pub fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

pub struct ReconciliationEngine {
    config: EngineConfig,
    clock: fn() -> f64,
}

impl ReconciliationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, epoch_seconds)
    }

    pub fn with_clock(config: EngineConfig, clock: fn() -> f64) -> Self {
        Self { config, clock }
    }

    fn tunnel_for(&self, candidate: &CandidateServer) -> TunnelProfile {
        let address = self.config.addresses.address_for(candidate.country_id);
        TunnelProfile::for_candidate(candidate, address, &self.config.private_key)
    }

    fn event_for(&self, settings: &PersistedSettings) -> Option<ChangeEvent> {
        Some(ChangeEvent::settings_changed(settings, &self.config.origin))
    }

    /// Run one pass for `id`
    ///
    /// The only fallible step is the bound server load query, which is
    /// issued solely when the profile is bound to a different server.
    pub async fn reconcile<C: ServerCatalog>(
        &self,
        catalog: &C,
        id: &ProfileId,
        candidate: &CandidateServer,
        existing: Option<StoredProfile>,
        interface_ready: bool,
    ) -> Result<Reconciliation, CatalogError> {
        let Some(existing) = existing else {
            let settings = PersistedSettings::from_candidate(id, candidate, (self.clock)());
            info!("{}: creating profile for {}", id, candidate.hostname);
            return Ok(Reconciliation {
                action: ReconciliationAction::Create,
                event: self.event_for(&settings),
                tunnel: self.tunnel_for(candidate),
                settings,
            });
        };

        let assessment = assess(candidate, &existing, interface_ready);
        debug!("{}: {:?}", id, assessment);

        match assessment {
            Assessment::RepairInterface => {
                info!(
                    "{}: interface {} is missing or out of date, rebuilding it for {}",
                    id,
                    id.interface_name(),
                    existing.settings.server_name
                );
                Ok(Reconciliation {
                    action: ReconciliationAction::InterfaceRepairOnly,
                    event: self.event_for(&existing.settings),
                    settings: existing.settings,
                    tunnel: existing.tunnel,
                })
            }
            Assessment::AlreadyBound => {
                debug!("{} is still recommended.", existing.settings.server_name);
                Ok(no_op(existing))
            }
            Assessment::CompareLoad { bound_server } => {
                let bound_load = catalog.server_load(&bound_server).await?;
                if !should_switch(bound_load, candidate.load, self.config.max_load) {
                    debug!("{} (load {}%) is still recommended.", bound_server, bound_load);
                    return Ok(no_op(existing));
                }

                info!(
                    "{} (load {}%) changed to {} (load {}%).",
                    bound_server, bound_load, candidate.hostname, candidate.load
                );
                let mut settings = existing.settings;
                settings.rebind(candidate, (self.clock)());
                Ok(Reconciliation {
                    action: ReconciliationAction::Update,
                    event: self.event_for(&settings),
                    tunnel: self.tunnel_for(candidate),
                    settings,
                })
            }
        }
    }
}

fn no_op(existing: StoredProfile) -> Reconciliation {
    Reconciliation {
        action: ReconciliationAction::NoOp,
        settings: existing.settings,
        tunnel: existing.tunnel,
        event: None,
    }
}

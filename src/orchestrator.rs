//! Per-run driver
//!
//! Processes the quick profile (when enabled) and then every configured
//! country: recommend a server, load the persisted profile, let the engine
//! decide, then apply the decision in a fixed order:
//!
//! 1. write settings and tunnel documents
//! 2. create the interface and push the peer configuration
//! 3. publish the change event
//!
//! A failure only ends the pass of the profile it belongs to; it is
//! recorded in the [`RunSummary`] and the remaining profiles still run.

use crate::catalog::{CatalogError, ServerCatalog, resolve_country};
use crate::config::Config;
use crate::events::EventPublisher;
use crate::platform::{InterfaceDriver, PlatformError};
use crate::profile::{ProfileId, ProfileStore, QUICK_COUNTRY_ID, StoreError};
use crate::reconcile::{Reconciliation, ReconciliationAction, ReconciliationEngine};
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const QUICK_LABEL: &str = "Quick";

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Interface(#[from] PlatformError),
}

/// Step of a profile pass, used to report where a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ListCountries,
    ResolveCountry,
    Recommend,
    LoadProfile,
    BoundServerLoad,
    SaveProfile,
    CreateInterface,
    ApplyPeerConfig,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::ListCountries => "list countries",
            Step::ResolveCountry => "resolve country",
            Step::Recommend => "recommend server",
            Step::LoadProfile => "load profile",
            Step::BoundServerLoad => "query bound server load",
            Step::SaveProfile => "save profile",
            Step::CreateInterface => "create interface",
            Step::ApplyPeerConfig => "apply peer config",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct ProfileFailure {
    /// Country name as configured, or "Quick"
    pub target: String,
    pub profile_id: Option<ProfileId>,
    pub step: Step,
    pub error: ProfileError,
}

impl fmt::Display for ProfileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.profile_id {
            Some(id) => write!(f, "{} [{}] failed to {}: {}", self.target, id, self.step, self.error),
            None => write!(f, "{} failed to {}: {}", self.target, self.step, self.error),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileOutcome {
    pub target: String,
    pub profile_id: ProfileId,
    pub action: ReconciliationAction,
    pub server_name: String,
    pub load: f64,
    pub published: bool,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<ProfileOutcome>,
    pub failures: Vec<ProfileFailure>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn count(&self, action: ReconciliationAction) -> usize {
        self.outcomes.iter().filter(|o| o.action == action).count()
    }

    fn fail(&mut self, target: &str, profile_id: Option<&ProfileId>, step: Step, error: ProfileError) {
        let failure = ProfileFailure {
            target: target.to_string(),
            profile_id: profile_id.cloned(),
            step,
            error,
        };
        error!("{}", failure);
        self.failures.push(failure);
    }
}

/// What to process in a run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub countries: Vec<String>,
    pub include_quick: bool,
    pub limit: u32,
    pub interface_prefix: String,
}

impl From<&Config> for RunOptions {
    fn from(config: &Config) -> Self {
        Self {
            countries: config.countries.clone(),
            include_quick: config.recommended,
            limit: config.limit,
            interface_prefix: config.interface_prefix.clone(),
        }
    }
}

pub struct Orchestrator<'a, C, D: ?Sized, P: ?Sized> {
    pub catalog: &'a C,
    pub store: &'a ProfileStore,
    pub driver: &'a D,
    pub publisher: &'a P,
    pub engine: &'a ReconciliationEngine,
    pub options: RunOptions,
}

impl<C, D, P> Orchestrator<'_, C, D, P>
where
    C: ServerCatalog,
    D: InterfaceDriver + ?Sized,
    P: EventPublisher + ?Sized,
{
    pub async fn run(&self) -> RunSummary {
        let mut summary = RunSummary::default();

        if self.options.include_quick {
            self.process(QUICK_COUNTRY_ID, QUICK_LABEL, &mut summary).await;
        }

        if self.options.countries.is_empty() {
            return summary;
        }

        let countries = match self.catalog.list_countries().await {
            Ok(countries) => countries,
            Err(e) => {
                // Without the directory no country id can be trusted
                for name in &self.options.countries {
                    summary.fail(name, None, Step::ListCountries, e.clone().into());
                }
                return summary;
            }
        };

        for name in &self.options.countries {
            match resolve_country(&countries, name) {
                Ok(country_id) => self.process(country_id, name, &mut summary).await,
                Err(e) => summary.fail(name, None, Step::ResolveCountry, e.into()),
            }
        }

        summary
    }

    async fn process(&self, country_id: u32, target: &str, summary: &mut RunSummary) {
        let id = ProfileId::new(&self.options.interface_prefix, country_id);
        debug!("Processing {} as {}", target, id);

        let candidate = match self.catalog.recommend_server(country_id, self.options.limit).await {
            Ok(candidate) => candidate,
            Err(e) => return summary.fail(target, Some(&id), Step::Recommend, e.into()),
        };

        let existing = match self.store.load(&id) {
            Ok(stored) => Some(stored),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return summary.fail(target, Some(&id), Step::LoadProfile, e.into()),
        };

        // An interface whose peers differ from the stored tunnel counts as missing
        let interface_ready = existing
            .as_ref()
            .is_some_and(|stored| self.driver.is_configured(&id, &stored.tunnel));

        let reconciliation = match self
            .engine
            .reconcile(self.catalog, &id, &candidate, existing, interface_ready)
            .await
        {
            Ok(reconciliation) => reconciliation,
            Err(e) => return summary.fail(target, Some(&id), Step::BoundServerLoad, e.into()),
        };

        if let Err((step, e)) = self.apply(&id, &reconciliation) {
            summary.fail(target, Some(&id), step, e);
            if step == Step::SaveProfile {
                return;
            }
        }

        let published = self.publish(&id, &reconciliation);
        summary.outcomes.push(ProfileOutcome {
            target: target.to_string(),
            profile_id: id,
            action: reconciliation.action,
            server_name: reconciliation.settings.server_name,
            load: reconciliation.settings.load.percent,
            published,
        });
    }

    /// Persist first, then touch the interface
    ///
    /// A failed save stops before the interface is modified. An interface
    /// failure leaves the documents as written; the next run retries it.
    fn apply(&self, id: &ProfileId, reconciliation: &Reconciliation) -> Result<(), (Step, ProfileError)> {
        let action = reconciliation.action;

        if action.persists() {
            self.store
                .save(id, &reconciliation.settings, &reconciliation.tunnel)
                .map_err(|e| (Step::SaveProfile, e.into()))?;
        }

        if action.touches_interface() {
            self.driver
                .create_interface(id, &reconciliation.tunnel.addresses)
                .map_err(|e| (Step::CreateInterface, e.into()))?;
            self.driver
                .apply_peer_config(id, &reconciliation.tunnel)
                .map_err(|e| (Step::ApplyPeerConfig, e.into()))?;
            info!("{}: {:?} applied to {}", id, action, id.interface_name());
        }

        Ok(())
    }

    fn publish(&self, id: &ProfileId, reconciliation: &Reconciliation) -> bool {
        let Some(event) = &reconciliation.event else {
            return false;
        };

        debug!(
            "refreshing routes for {} (load {}%).",
            reconciliation.settings.server_name, reconciliation.settings.load.percent
        );
        match self.publisher.publish(event) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}: change event not delivered: {}", id, e);
                false
            }
        }
    }
}

//! Profile data model
//!
//! Field names of the persisted documents follow the layout the VPN client
//! on the router already reads, so the JSON keys are fixed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Country id reserved for the "best server overall" profile
pub const QUICK_COUNTRY_ID: u32 = 0;

pub const WIREGUARD_PORT: u16 = 51820;
pub const PERSISTENT_KEEPALIVE_SECS: u16 = 20;
pub const DEFAULT_ALLOWED_IP: &str = "0.0.0.0/0";
pub const DEFAULT_DNS: &str = "1.1.1.1";
pub const SETTINGS_CHANGED_EVENT: &str = "VPNClient:SettingsChanged";

/// Identifier joining all persisted artifacts of one tunnel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProfileId(String);

impl ProfileId {
    pub fn new(prefix: &str, country_id: u32) -> Self {
        Self(format!("{}{}", prefix, country_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the kernel network interface carrying this profile
    pub fn interface_name(&self) -> String {
        format!("vpn_{}", self.0)
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProfileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A server currently recommended by the directory, with its load
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateServer {
    pub hostname: String,
    pub station: String,
    pub public_key: String,
    pub country_id: u32,
    pub country_name: String,
    pub city_name: String,
    pub load: f64,
}

impl CandidateServer {
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.country_name, self.city_name)
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.station, WIREGUARD_PORT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ServerLoad {
    #[serde(default)]
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingFlags {
    #[serde(rename = "overrideDefaultRoute")]
    pub override_default_route: bool,
    #[serde(rename = "routeDNS")]
    pub route_dns: bool,
    #[serde(rename = "strictVPN")]
    pub strict_vpn: bool,
}

impl Default for RoutingFlags {
    fn default() -> Self {
        Self {
            override_default_route: true,
            route_dns: false,
            strict_vpn: true,
        }
    }
}

/// Durable per-profile settings
///
/// `server_name` always names the server the live tunnel is configured
/// against, which may differ from the latest recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSettings {
    pub subtype: String,
    pub profile_id: String,
    #[serde(default)]
    pub device_count: u32,
    #[serde(default)]
    pub load: ServerLoad,
    pub display_name: String,
    pub server_name: String,
    #[serde(rename = "serverDDNS", default)]
    pub server_endpoint: String,
    #[serde(default)]
    pub server_subnets: Vec<String>,
    #[serde(flatten)]
    pub routing: RoutingFlags,
    pub created_date: f64,
}

impl PersistedSettings {
    /// Fresh settings for a profile that has never been persisted
    pub fn from_candidate(profile_id: &ProfileId, candidate: &CandidateServer, now: f64) -> Self {
        Self {
            subtype: "wireguard".to_string(),
            profile_id: profile_id.to_string(),
            device_count: 0,
            load: ServerLoad::default(),
            display_name: candidate.display_name(),
            server_name: candidate.hostname.clone(),
            server_endpoint: candidate.station.clone(),
            server_subnets: Vec::new(),
            routing: RoutingFlags::default(),
            created_date: now,
        }
    }

    /// Rebind to a new server, recording the candidate's load as the target
    pub fn rebind(&mut self, candidate: &CandidateServer, now: f64) {
        self.display_name = candidate.display_name();
        self.server_name = candidate.hostname.clone();
        self.server_endpoint = candidate.station.clone();
        self.load.percent = candidate.load;
        self.created_date = now;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    #[serde(rename = "publicKey")]
    pub public_key: String,
    pub endpoint: String,
    #[serde(rename = "persistentKeepalive")]
    pub persistent_keepalive: u16,
    #[serde(rename = "allowedIPs")]
    pub allowed_ips: Vec<String>,
}

/// WireGuard configuration of one single-hop tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelProfile {
    pub peers: Vec<Peer>,
    pub addresses: Vec<String>,
    #[serde(rename = "privateKey")]
    pub private_key: String,
    pub dns: Vec<String>,
}

impl TunnelProfile {
    pub fn for_candidate(candidate: &CandidateServer, address: String, private_key: &str) -> Self {
        Self {
            peers: vec![Peer {
                public_key: candidate.public_key.clone(),
                endpoint: candidate.endpoint(),
                persistent_keepalive: PERSISTENT_KEEPALIVE_SECS,
                allowed_ips: vec![DEFAULT_ALLOWED_IP.to_string()],
            }],
            addresses: vec![address],
            private_key: private_key.to_string(),
            dns: vec![DEFAULT_DNS.to_string()],
        }
    }
}

/// Notification telling dependents that a profile's routing must be refreshed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "profileId")]
    pub profile_id: String,
    pub settings: PersistedSettings,
    #[serde(rename = "fromProcess")]
    pub from_process: String,
}

impl ChangeEvent {
    pub fn settings_changed(settings: &PersistedSettings, origin: &str) -> Self {
        Self {
            kind: SETTINGS_CHANGED_EVENT.to_string(),
            profile_id: settings.profile_id.clone(),
            settings: settings.clone(),
            from_process: origin.to_string(),
        }
    }
}

//! HTTP client for the NordVPN server directory API

use super::{CatalogError, Country, ServerCatalog, least_loaded};
use crate::config::ApiConfig;
use crate::profile::{CandidateServer, QUICK_COUNTRY_ID};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

const TECHNOLOGY: &str = "wireguard_udp";
const QUICK_COUNTRY_NAME: &str = "Quick";
const SERVERS_PATH: &str = "/v1/servers";
const STATS_PATH: &str = "/server/stats";

#[derive(Debug, Deserialize)]
struct ApiServer {
    hostname: String,
    station: String,
    load: f64,
    #[serde(default)]
    technologies: Vec<ApiTechnology>,
    #[serde(default)]
    locations: Vec<ApiLocation>,
}

#[derive(Debug, Deserialize)]
struct ApiTechnology {
    identifier: String,
    #[serde(default)]
    metadata: Vec<ApiMetadata>,
}

#[derive(Debug, Deserialize)]
struct ApiMetadata {
    value: String,
}

#[derive(Debug, Deserialize)]
struct ApiLocation {
    country: ApiLocationCountry,
}

#[derive(Debug, Deserialize)]
struct ApiLocationCountry {
    name: String,
    city: ApiCity,
}

#[derive(Debug, Deserialize)]
struct ApiCity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiStats {
    percent: f64,
}

pub struct NordCatalog {
    client: Client,
    base_url: String,
}

impl NordCatalog {
    pub fn new(api: &ApiConfig) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .user_agent(concat!("lynx-sync/", env!("CARGO_PKG_VERSION")))
            .timeout(api.timeout())
            .build()
            .map_err(|e| CatalogError::UpstreamUnavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: api.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn recommendations_url(&self, country_id: u32, limit: u32) -> String {
        let mut url = format!(
            "{}{}/recommendations?filters[servers_technologies][identifier]={}",
            self.base_url, SERVERS_PATH, TECHNOLOGY
        );
        if country_id != QUICK_COUNTRY_ID {
            url.push_str(&format!("&filters[country_id]={}", country_id));
        }
        url.push_str(&format!("&limit={}", limit));
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, action: &str) -> Result<T, CatalogError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CatalogError::UpstreamUnavailable(format!("{action}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::UpstreamUnavailable(format!(
                "{action} failed ({status})"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CatalogError::UpstreamUnavailable(format!("{action}: {e}")))?;
        serde_json::from_str(&body)
            .map_err(|e| CatalogError::InvalidResponse(format!("{action}: {e}")))
    }
}

impl ServerCatalog for NordCatalog {
    async fn list_countries(&self) -> Result<Vec<Country>, CatalogError> {
        let url = format!("{}{}/countries", self.base_url, SERVERS_PATH);
        self.get_json(&url, "country list").await
    }

    async fn recommend_server(&self, country_id: u32, limit: u32) -> Result<CandidateServer, CatalogError> {
        let url = self.recommendations_url(country_id, limit);
        let servers: Vec<ApiServer> = self.get_json(&url, "recommendations").await?;
        debug!(
            "{} recommendation(s) for country id {}",
            servers.len(),
            country_id
        );

        let server = if limit > 1 {
            least_loaded(&servers, |s| s.load)
        } else {
            servers.first()
        }
        .ok_or(CatalogError::NoCandidateFound(country_id))?;

        to_candidate(server, country_id)
    }

    async fn server_load(&self, hostname: &str) -> Result<f64, CatalogError> {
        let url = format!("{}{}/{}", self.base_url, STATS_PATH, hostname);
        let stats: ApiStats = self.get_json(&url, "server stats").await?;
        Ok(stats.percent)
    }
}

fn to_candidate(server: &ApiServer, country_id: u32) -> Result<CandidateServer, CatalogError> {
    let public_key = server
        .technologies
        .iter()
        .find(|t| t.identifier == TECHNOLOGY)
        .and_then(|t| t.metadata.first())
        .map(|m| m.value.clone())
        .ok_or_else(|| {
            CatalogError::InvalidResponse(format!("{} has no {} public key", server.hostname, TECHNOLOGY))
        })?;

    let location = server.locations.first().ok_or_else(|| {
        CatalogError::InvalidResponse(format!("{} has no location", server.hostname))
    })?;

    let country_name = if country_id == QUICK_COUNTRY_ID {
        QUICK_COUNTRY_NAME.to_string()
    } else {
        location.country.name.clone()
    };

    Ok(CandidateServer {
        hostname: server.hostname.clone(),
        station: server.station.clone(),
        public_key,
        country_id,
        country_name,
        city_name: location.country.city.name.clone(),
        load: server.load,
    })
}

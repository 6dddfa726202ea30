//! Durable per-profile documents
//!
//! Each profile owns two JSON files in the profile directory:
//! `{id}.settings` (PersistedSettings) and `{id}.json` (TunnelProfile).
//! Writes go to a temporary file that is synced and renamed over the
//! target, so readers never observe a half-written document.

use super::types::{PersistedSettings, ProfileId, TunnelProfile};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const SETTINGS_EXT: &str = "settings";
const PROFILE_EXT: &str = "json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Profile not found: {0}")]
    NotFound(String),
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("Malformed document {path}: {source}")]
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Both documents of a persisted profile
#[derive(Debug, Clone, PartialEq)]
pub struct StoredProfile {
    pub settings: PersistedSettings,
    pub tunnel: TunnelProfile,
}

pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings_path(&self, id: &ProfileId) -> PathBuf {
        self.dir.join(format!("{}.{}", id, SETTINGS_EXT))
    }

    pub fn profile_path(&self, id: &ProfileId) -> PathBuf {
        self.dir.join(format!("{}.{}", id, PROFILE_EXT))
    }

    /// Load both documents of a profile
    ///
    /// A profile only counts as present when both documents exist; a
    /// missing document of either kind yields `StoreError::NotFound`.
    pub fn load(&self, id: &ProfileId) -> Result<StoredProfile, StoreError> {
        let tunnel = read_document(&self.profile_path(id), id)?;
        let settings = read_document(&self.settings_path(id), id)?;
        Ok(StoredProfile { settings, tunnel })
    }

    /// Persist settings and tunnel profile, creating the directory if needed
    pub fn save(
        &self,
        id: &ProfileId,
        settings: &PersistedSettings,
        tunnel: &TunnelProfile,
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        write_document(&self.settings_path(id), settings)?;
        write_document(&self.profile_path(id), tunnel)?;
        debug!("Saved profile {} to {}", id, self.dir.display());
        Ok(())
    }

    /// Settings of every profile owned by `prefix`, sorted by id
    ///
    /// The directory is shared with other VPN clients: documents whose
    /// name is not `<prefix><country id>` are ignored, and unreadable ones
    /// are skipped with a warning.
    pub fn list(&self, prefix: &str) -> Result<Vec<PersistedSettings>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };

        let mut settings = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| StoreError::Io {
                    path: self.dir.clone(),
                    source,
                })?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some(SETTINGS_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !is_owned(stem, prefix) {
                continue;
            }
            match read_document(&path, &ProfileId::from(stem)) {
                Ok(document) => settings.push(document),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
        settings.sort_by(|a: &PersistedSettings, b| a.profile_id.cmp(&b.profile_id));
        Ok(settings)
    }
}

fn is_owned(stem: &str, prefix: &str) -> bool {
    stem.strip_prefix(prefix)
        .is_some_and(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
}

fn read_document<T: DeserializeOwned>(path: &Path, id: &ProfileId) -> Result<T, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_str(&content).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })
}

fn write_document<T: Serialize>(path: &Path, document: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string(document).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    {
        let mut file = fs::File::create(&temp_path).map_err(io_err)?;
        file.write_all(json.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
    }
    fs::rename(&temp_path, path).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::types::CandidateServer;
    use tempfile::TempDir;

    fn candidate() -> CandidateServer {
        CandidateServer {
            hostname: "se402.nordvpn.com".to_string(),
            station: "195.181.166.1".to_string(),
            public_key: "pk".to_string(),
            country_id: 208,
            country_name: "Sweden".to_string(),
            city_name: "Stockholm".to_string(),
            load: 9.0,
        }
    }

    fn documents(id: &ProfileId) -> (PersistedSettings, TunnelProfile) {
        let server = candidate();
        (
            PersistedSettings::from_candidate(id, &server, 100.0),
            TunnelProfile::for_candidate(&server, "10.5.0.208/24".to_string(), "priv"),
        )
    }

    #[test]
    fn test_paths() {
        let store = ProfileStore::new("/var/run/wg_profile");
        let id = ProfileId::new("lynx", 3);
        assert_eq!(store.settings_path(&id), PathBuf::from("/var/run/wg_profile/lynx3.settings"));
        assert_eq!(store.profile_path(&id), PathBuf::from("/var/run/wg_profile/lynx3.json"));
    }

    #[test]
    fn test_load_missing_profile() {
        let temp_dir = TempDir::new().unwrap();
        let store = ProfileStore::new(temp_dir.path());
        let result = store.load(&ProfileId::new("lynx", 3));
        assert!(matches!(result, Err(StoreError::NotFound(id)) if id == "lynx3"));
    }

    #[test]
    fn test_save_creates_directory_and_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("nested").join("wg_profile");
        let store = ProfileStore::new(&dir);
        let id = ProfileId::new("lynx", 208);
        let (settings, tunnel) = documents(&id);

        store.save(&id, &settings, &tunnel).unwrap();

        assert!(dir.join("lynx208.settings").exists());
        assert!(dir.join("lynx208.json").exists());
        assert!(!dir.join("lynx208.settings.tmp").exists());

        let stored = store.load(&id).unwrap();
        assert_eq!(stored.settings, settings);
        assert_eq!(stored.tunnel, tunnel);
    }

    #[test]
    fn test_missing_tunnel_document_counts_as_absent() {
        let temp_dir = TempDir::new().unwrap();
        let store = ProfileStore::new(temp_dir.path());
        let id = ProfileId::new("lynx", 208);
        let (settings, tunnel) = documents(&id);
        store.save(&id, &settings, &tunnel).unwrap();

        fs::remove_file(store.profile_path(&id)).unwrap();

        assert!(matches!(store.load(&id), Err(StoreError::NotFound(_))));
        assert!(store.settings_path(&id).exists());
    }

    #[test]
    fn test_corrupt_document_is_surfaced() {
        let temp_dir = TempDir::new().unwrap();
        let store = ProfileStore::new(temp_dir.path());
        let id = ProfileId::new("lynx", 3);
        fs::write(store.profile_path(&id), "{}").unwrap();
        fs::write(store.settings_path(&id), "{not json").unwrap();

        assert!(matches!(store.load(&id), Err(StoreError::Serialize { .. })));
    }

    #[test]
    fn test_unreadable_path_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = ProfileStore::new(temp_dir.path());
        let id = ProfileId::new("lynx", 3);
        // A directory where a file is expected cannot be read as a document
        fs::create_dir(store.profile_path(&id)).unwrap();

        assert!(matches!(store.load(&id), Err(StoreError::Io { .. })));
    }

    #[test]
    fn test_list() {
        let temp_dir = TempDir::new().unwrap();
        let store = ProfileStore::new(temp_dir.path());
        for country in [208, 3] {
            let id = ProfileId::new("lynx", country);
            let (settings, tunnel) = documents(&id);
            store.save(&id, &settings, &tunnel).unwrap();
        }
        fs::write(temp_dir.path().join("unrelated.txt"), "x").unwrap();

        let listed = store.list("lynx").unwrap();
        let ids: Vec<_> = listed.iter().map(|s| s.profile_id.as_str()).collect();
        assert_eq!(ids, vec!["lynx208", "lynx3"]);
    }

    #[test]
    fn test_list_skips_foreign_and_unreadable_documents() {
        let temp_dir = TempDir::new().unwrap();
        let store = ProfileStore::new(temp_dir.path());
        let id = ProfileId::new("lynx", 208);
        let (settings, tunnel) = documents(&id);
        store.save(&id, &settings, &tunnel).unwrap();

        // Profiles of other VPN clients sharing the directory
        fs::write(temp_dir.path().join("other.settings"), r#"{"x":1}"#).unwrap();
        fs::write(temp_dir.path().join("lynxhome.settings"), r#"{"x":1}"#).unwrap();
        // One of ours, but damaged
        fs::write(temp_dir.path().join("lynx3.settings"), "{not json").unwrap();

        let listed = store.list("lynx").unwrap();
        assert_eq!(listed, vec![settings]);

        assert!(store.list("other").unwrap().is_empty());
    }

    #[test]
    fn test_is_owned() {
        assert!(is_owned("lynx0", "lynx"));
        assert!(is_owned("lynx208", "lynx"));
        assert!(!is_owned("lynx", "lynx"));
        assert!(!is_owned("lynxhome", "lynx"));
        assert!(!is_owned("other", "lynx"));
    }

    #[test]
    fn test_list_missing_directory() {
        let store = ProfileStore::new("/nonexistent/lynx-sync/profiles");
        assert!(store.list("lynx").unwrap().is_empty());
    }
}

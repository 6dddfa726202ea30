//! Tunnel profiles: data model and durable storage

pub mod store;
pub mod types;

pub use store::{ProfileStore, StoreError, StoredProfile};
pub use types::{
    CandidateServer, ChangeEvent, PersistedSettings, ProfileId, TunnelProfile, QUICK_COUNTRY_ID,
};

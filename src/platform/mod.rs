//! Platform-specific tunnel interface control

#[cfg(target_os = "linux")]
pub mod linux;

use crate::profile::{ProfileId, TunnelProfile};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Interface command `{command}` failed: {message}")]
    InterfaceCommandError { command: String, message: String },
    #[error("Unsupported platform")]
    UnsupportedPlatform,
}

/// Reports the live state of a profile's network interface
pub trait InterfaceProbe {
    /// Absence is an expected state, not an error
    fn exists(&self, id: &ProfileId) -> bool;

    /// Whether the interface exists and carries exactly the peers of
    /// `profile`. An interface left behind by a failed apply is not
    /// configured.
    fn is_configured(&self, id: &ProfileId, profile: &TunnelProfile) -> bool;
}

/// Creates tunnel interfaces and pushes WireGuard peer configuration
///
/// Both operations are idempotent: repeating them with the same input
/// leaves the interface in the same state without duplicate peers.
pub trait InterfaceDriver: InterfaceProbe {
    fn create_interface(&self, id: &ProfileId, addresses: &[String]) -> Result<(), PlatformError>;
    fn apply_peer_config(&self, id: &ProfileId, profile: &TunnelProfile) -> Result<(), PlatformError>;
}

/// Render a profile in `wg setconf` format
pub fn render_wg_config(profile: &TunnelProfile) -> String {
    let mut config = format!("[Interface]\nPrivateKey = {}\n", profile.private_key);
    for peer in &profile.peers {
        config.push_str("\n[Peer]\n");
        config.push_str(&format!("PublicKey = {}\n", peer.public_key));
        config.push_str(&format!("Endpoint = {}\n", peer.endpoint));
        config.push_str(&format!("PersistentKeepalive = {}\n", peer.persistent_keepalive));
        config.push_str(&format!("AllowedIPs = {}\n", peer.allowed_ips.join(", ")));
    }
    config
}

/// Get the interface driver for the current platform
pub fn get_interface_driver() -> Result<Box<dyn InterfaceDriver>, PlatformError> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::LinuxInterfaceDriver::new()))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(PlatformError::UnsupportedPlatform)
    }
}

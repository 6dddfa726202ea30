//! Linux WireGuard interface control via `ip` and `wg`

use super::{InterfaceDriver, InterfaceProbe, PlatformError, render_wg_config};
use crate::profile::{ProfileId, TunnelProfile};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tracing::{debug, warn};

const DEFAULT_MTU: u16 = 1412;

pub struct LinuxInterfaceDriver {
    sys_class_net: PathBuf,
    mtu: u16,
}

impl LinuxInterfaceDriver {
    pub fn new() -> Self {
        Self {
            sys_class_net: PathBuf::from("/sys/class/net"),
            mtu: DEFAULT_MTU,
        }
    }

    /// Probe a different sysfs root (for testing)
    pub fn with_sysfs_root(sys_class_net: PathBuf) -> Self {
        Self {
            sys_class_net,
            ..Self::new()
        }
    }
}

impl Default for LinuxInterfaceDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl InterfaceProbe for LinuxInterfaceDriver {
    fn exists(&self, id: &ProfileId) -> bool {
        self.sys_class_net.join(id.interface_name()).exists()
    }

    fn is_configured(&self, id: &ProfileId, profile: &TunnelProfile) -> bool {
        if !self.exists(id) {
            return false;
        }
        let name = id.interface_name();
        match run_capture("wg", &["show", &name, "endpoints"]) {
            Ok(output) => peers_match(&output, profile),
            Err(e) => {
                warn!("Could not read peers of {}: {}", name, e);
                false
            }
        }
    }
}

impl InterfaceDriver for LinuxInterfaceDriver {
    fn create_interface(&self, id: &ProfileId, addresses: &[String]) -> Result<(), PlatformError> {
        let name = id.interface_name();

        if !self.exists(id) {
            run("ip", &["link", "add", "dev", &name, "type", "wireguard"])?;
        }
        run("ip", &["link", "set", "dev", &name, "mtu", &self.mtu.to_string()])?;
        for address in addresses {
            // `replace` keeps re-runs from failing on an already assigned address
            run("ip", &["address", "replace", address, "dev", &name])?;
        }
        run("ip", &["link", "set", "up", "dev", &name])?;

        debug!("Interface {} is up with {:?}", name, addresses);
        Ok(())
    }

    fn apply_peer_config(&self, id: &ProfileId, profile: &TunnelProfile) -> Result<(), PlatformError> {
        let name = id.interface_name();
        // syncconf replaces the peer set, so repeated applies never duplicate peers
        run_with_stdin("wg", &["syncconf", &name, "/dev/stdin"], &render_wg_config(profile))?;
        debug!("Applied {} peer(s) to {}", profile.peers.len(), name);
        Ok(())
    }
}

fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

fn check(program: &str, args: &[&str], output: Output) -> Result<(), PlatformError> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PlatformError::InterfaceCommandError {
            command: command_line(program, args),
            message: stderr.trim().to_string(),
        });
    }
    Ok(())
}

fn run(program: &str, args: &[&str]) -> Result<(), PlatformError> {
    debug!("Running: {}", command_line(program, args));
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| PlatformError::InterfaceCommandError {
            command: command_line(program, args),
            message: e.to_string(),
        })?;
    check(program, args, output)
}

fn run_capture(program: &str, args: &[&str]) -> Result<String, PlatformError> {
    debug!("Running: {}", command_line(program, args));
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| PlatformError::InterfaceCommandError {
            command: command_line(program, args),
            message: e.to_string(),
        })?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    check(program, args, output)?;
    Ok(stdout)
}

/// Compare `wg show <if> endpoints` output (`<public key>\t<endpoint>` per
/// line) with the peers of `profile`, ignoring order
fn peers_match(output: &str, profile: &TunnelProfile) -> bool {
    let mut live: Vec<(&str, &str)> = output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            Some((fields.next()?, fields.next().unwrap_or("(none)")))
        })
        .collect();
    let mut wanted: Vec<(&str, &str)> = profile
        .peers
        .iter()
        .map(|p| (p.public_key.as_str(), p.endpoint.as_str()))
        .collect();
    live.sort_unstable();
    wanted.sort_unstable();
    live == wanted
}

fn run_with_stdin(program: &str, args: &[&str], input: &str) -> Result<(), PlatformError> {
    // Key material only ever travels over stdin
    debug!("Running: {}", command_line(program, args));
    let spawn_err = |e: std::io::Error| PlatformError::InterfaceCommandError {
        command: command_line(program, args),
        message: e.to_string(),
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes()).map_err(spawn_err)?;
    }

    let output = child.wait_with_output().map_err(spawn_err)?;
    check(program, args, output)
}

// src/host.rs

//! Local host identity.

use std::net::{IpAddr, ToSocketAddrs};

use tracing::debug;

/// Hosts that mean "every interface" when binding a server.
const WILDCARD_HOSTS: &[&str] = &["", "0.0.0.0", "::0", "::"];

/// Name of this machine, or `"localhost"` if it cannot be read.
pub fn hostname() -> String {
    match ::hostname::get() {
        Ok(name) => name
            .into_string()
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "localhost".to_string()),
        Err(err) => {
            debug!(error = %err, "cannot read hostname");
            "localhost".to_string()
        }
    }
}

/// Address other machines can use to reach this one: the first IPv4
/// address the hostname resolves to, else any resolved address, else the
/// hostname itself.
pub fn local_address() -> String {
    let name = hostname();
    let resolved: Vec<IpAddr> = match (name.as_str(), 0u16).to_socket_addrs() {
        Ok(addrs) => addrs.map(|a| a.ip()).collect(),
        Err(err) => {
            debug!(host = %name, error = %err, "cannot resolve own hostname");
            Vec::new()
        }
    };
    resolved
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| resolved.first())
        .map(|ip| ip.to_string())
        .unwrap_or(name)
}

pub fn is_wildcard_host(host: &str) -> bool {
    WILDCARD_HOSTS.contains(&host)
}

/// Replace a wildcard bind host with [`local_address`].
pub fn reachable_host(host: &str) -> String {
    if is_wildcard_host(host) {
        local_address()
    } else {
        host.to_string()
    }
}

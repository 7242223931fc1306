//! Input validation for redirect configuration
//!
//! These checks run in the CLI/config layer before a [`RedirectSpec`] is
//! handed to the reconciler, so that nft never sees malformed input.
//!
//! [`RedirectSpec`]: crate::core::rule::RedirectSpec

use crate::core::rule::OS_WILDCARD;
use ipnetwork::{IpNetwork, Ipv4Network};
use std::net::{IpAddr, Ipv4Addr};

/// Validates a port number.
///
/// # Errors
///
/// Returns `Err` if port is 0.
pub fn validate_port(port: u16) -> Result<u16, String> {
    if port == 0 {
        Err("Port must be between 1 and 65535".to_string())
    } else {
        Ok(port)
    }
}

/// Validates a host interface name or wildcard pattern.
///
/// Linux kernel interface name rules:
/// - Max 15 characters (IFNAMSIZ - 1)
/// - Alphanumeric, dot, dash, underscore only
/// - Cannot be "." or ".."
///
/// A single trailing `+` marks a prefix pattern (`cali+`).
///
/// # Errors
///
/// Returns `Err` if the name violates kernel constraints.
pub fn validate_interface(name: &str) -> Result<String, String> {
    if name.is_empty() {
        return Err("Interface name must not be empty".to_string());
    }

    let base = name.strip_suffix(OS_WILDCARD).unwrap_or(name);

    if base.len() > 15 {
        return Err("Interface name too long (max 15 characters)".to_string());
    }

    if base == "." || base == ".." {
        return Err("Invalid interface name".to_string());
    }

    if base.contains(OS_WILDCARD) {
        return Err("Wildcard '+' is only allowed at the end of the name".to_string());
    }

    // Check for valid characters (ASCII alphanumeric only, plus dot, dash, underscore)
    if !base
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err("Interface name contains invalid characters".to_string());
    }

    Ok(name.to_string())
}

/// Validates the metadata service address (IPv4 address or CIDR).
///
/// # Errors
///
/// Returns `Err` for unparseable input or IPv6; the redirect table is IPv4-only.
pub fn validate_metadata_address(address: &str) -> Result<Ipv4Network, String> {
    match address.parse::<IpNetwork>() {
        Ok(IpNetwork::V4(net)) => Ok(net),
        Ok(IpNetwork::V6(_)) => Err("IPv6 addresses are not supported".to_string()),
        Err(e) => Err(format!("Invalid address or CIDR '{address}': {e}")),
    }
}

/// Validates the address the agent listens on.
///
/// # Errors
///
/// Returns `Err` unless `address` is a single IPv4 address.
pub fn validate_host_ip(address: &str) -> Result<Ipv4Addr, String> {
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) if ip.is_unspecified() => Err("Host IP must not be 0.0.0.0".to_string()),
        Ok(IpAddr::V4(ip)) => Ok(ip),
        Ok(IpAddr::V6(_)) => Err("IPv6 addresses are not supported".to_string()),
        Err(_) => Err(format!("Invalid IP address '{address}'")),
    }
}

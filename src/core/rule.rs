//! Redirect rule model and rendering
//!
//! Everything here is pure: the same [`RedirectSpec`] always renders to the
//! same [`RuleExpression`] text, which is what the installer searches for in
//! `nft list chain` output.

use ipnetwork::Ipv4Network;
use std::fmt;

/// Address family of the table
pub const FAMILY: &str = "ip";
/// Table holding the redirect chain
pub const TABLE_NAME: &str = "kube2iam";
/// Chain bound to the NAT pre-routing hook
pub const CHAIN_NAME: &str = "prerouting";
/// Chain type
pub const CHAIN_TYPE: &str = "nat";
/// Netfilter hook the chain is attached to
pub const HOOK: &str = "prerouting";
/// Chain priority; runs ahead of the default dstnat (0) chains
pub const CHAIN_PRIORITY: i32 = -100;
/// Destination port of the metadata service
pub const METADATA_PORT: u16 = 80;

/// Interface wildcard as written in Linux/iptables (`cali+`)
pub const OS_WILDCARD: char = '+';
/// Interface wildcard understood by nft (`cali*`)
pub const NFT_WILDCARD: char = '*';

/// Desired redirect, immutable for one reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectSpec {
    /// Port the local agent listens on
    pub app_port: u16,
    /// Metadata service address, IPv4 address or CIDR
    pub metadata_address: String,
    /// Ingress interface, literal or ending in `+`
    pub host_interface: String,
    /// Address the agent is reachable on
    pub host_ip: String,
}

impl RedirectSpec {
    pub fn new(
        app_port: u16,
        metadata_address: impl Into<String>,
        host_interface: impl Into<String>,
        host_ip: impl Into<String>,
    ) -> Self {
        Self {
            app_port,
            metadata_address: metadata_address.into(),
            host_interface: host_interface.into(),
            host_ip: host_ip.into(),
        }
    }

    /// Whether the interface is a pattern rather than a concrete name
    pub fn has_wildcard_interface(&self) -> bool {
        is_wildcard_interface(&self.host_interface)
    }

    /// Renders the canonical rule expression for this spec
    pub fn rule_expression(&self) -> RuleExpression {
        RuleExpression::render(self)
    }
}

/// Returns true if `name` contains the OS wildcard character.
pub fn is_wildcard_interface(name: &str) -> bool {
    name.contains(OS_WILDCARD)
}

/// Rewrites OS-style interface wildcards into nft's syntax.
///
/// Total over all inputs; only `+` characters change.
pub fn normalize_interface(name: &str) -> String {
    name.replace(OS_WILDCARD, &NFT_WILDCARD.to_string())
}

/// Renders the metadata address the way `nft list` prints it.
///
/// A `/32` network is printed by nft as the bare address, so `169.254.169.254/32`
/// and `169.254.169.254` must render identically. Wider networks are printed
/// masked (`169.254.169.254/16` lists as `169.254.0.0/16`). Anything that does
/// not parse is passed through untouched.
fn canonical_address(address: &str) -> String {
    match address.parse::<Ipv4Network>() {
        Ok(net) if net.prefix() == 32 => net.ip().to_string(),
        Ok(net) => format!("{}/{}", net.network(), net.prefix()),
        Err(_) => address.to_string(),
    }
}

/// Canonical nft rule expression for a redirect.
///
/// Format: `ip daddr <addr> tcp dport 80 iifname "<iface>" dnat to <host_ip>:<port>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleExpression(String);

impl RuleExpression {
    pub fn render(spec: &RedirectSpec) -> Self {
        Self(format!(
            "ip daddr {} tcp dport {} iifname \"{}\" dnat to {}:{}",
            canonical_address(&spec.metadata_address),
            METADATA_PORT,
            normalize_interface(&spec.host_interface),
            spec.host_ip,
            spec.app_port,
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Literal substring match against a chain listing
    pub fn is_listed_in(&self, listing: &str) -> bool {
        listing.contains(self.as_str())
    }
}

impl fmt::Display for RuleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `nft add table ip kube2iam`
pub fn add_table_args() -> Vec<String> {
    ["add", "table", FAMILY, TABLE_NAME]
        .map(String::from)
        .to_vec()
}

/// `nft add chain ip kube2iam prerouting { type nat hook prerouting priority -100 ; }`
pub fn add_chain_args() -> Vec<String> {
    let priority = CHAIN_PRIORITY.to_string();
    [
        "add",
        "chain",
        FAMILY,
        TABLE_NAME,
        CHAIN_NAME,
        "{",
        "type",
        CHAIN_TYPE,
        "hook",
        HOOK,
        "priority",
        priority.as_str(),
        ";",
        "}",
    ]
    .map(String::from)
    .to_vec()
}

/// `nft list chain ip kube2iam prerouting`
pub fn list_chain_args() -> Vec<String> {
    ["list", "chain", FAMILY, TABLE_NAME, CHAIN_NAME]
        .map(String::from)
        .to_vec()
}

/// `nft add rule ip kube2iam prerouting <expression>`
pub fn add_rule_args(rule: &RuleExpression) -> Vec<String> {
    ["add", "rule", FAMILY, TABLE_NAME, CHAIN_NAME, rule.as_str()]
        .map(String::from)
        .to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn spec(iface: &str) -> RedirectSpec {
        RedirectSpec::new(8080, "169.254.169.254", iface, "10.0.0.5")
    }

    #[test]
    fn test_render_literal_interface() {
        assert_eq!(
            spec("eth0").rule_expression().as_str(),
            "ip daddr 169.254.169.254 tcp dport 80 iifname \"eth0\" dnat to 10.0.0.5:8080"
        );
    }

    #[test]
    fn test_render_wildcard_interface() {
        let rule = spec("eth+").rule_expression();
        assert!(rule.as_str().contains("iifname \"eth*\""));
        assert!(!rule.as_str().contains('+'));
    }

    #[test]
    fn test_render_is_deterministic() {
        let s = spec("cali+");
        assert_eq!(s.rule_expression(), s.clone().rule_expression());
    }

    #[test]
    fn test_host_cidr_renders_as_address() {
        let a = RedirectSpec::new(8181, "169.254.169.254/32", "docker0", "172.17.0.1");
        let b = RedirectSpec::new(8181, "169.254.169.254", "docker0", "172.17.0.1");
        assert_eq!(a.rule_expression(), b.rule_expression());
    }

    #[test]
    fn test_network_cidr_kept() {
        let s = RedirectSpec::new(8181, "169.254.0.0/16", "docker0", "172.17.0.1");
        let rule = s.rule_expression();
        assert!(rule.as_str().starts_with("ip daddr 169.254.0.0/16 "));
    }

    #[test]
    fn test_cidr_host_bits_masked() {
        let host_bits = RedirectSpec::new(8181, "169.254.169.254/16", "docker0", "172.17.0.1");
        let masked = RedirectSpec::new(8181, "169.254.0.0/16", "docker0", "172.17.0.1");
        let rule = host_bits.rule_expression();
        assert_eq!(rule, masked.rule_expression());
        assert!(rule.as_str().starts_with("ip daddr 169.254.0.0/16 "));
    }

    #[test]
    fn test_is_listed_in_chain_output() {
        let rule = spec("eth0").rule_expression();
        let listing = format!(
            "table ip kube2iam {{\n\tchain prerouting {{\n\t\ttype nat hook prerouting priority dstnat - 100; policy accept;\n\t\t{rule}\n\t}}\n}}\n"
        );
        assert!(rule.is_listed_in(&listing));
        assert!(!spec("eth1").rule_expression().is_listed_in(&listing));
    }

    #[test]
    fn test_normalize_without_wildcard_unchanged() {
        assert_eq!(normalize_interface("docker0"), "docker0");
        assert_eq!(normalize_interface(""), "");
    }

    #[test]
    fn test_normalize_multiple_wildcards() {
        assert_eq!(normalize_interface("a+b+"), "a*b*");
    }

    #[test]
    fn test_command_args() {
        assert_eq!(add_table_args().join(" "), "add table ip kube2iam");
        assert_eq!(
            add_chain_args().join(" "),
            "add chain ip kube2iam prerouting { type nat hook prerouting priority -100 ; }"
        );
        assert_eq!(
            list_chain_args().join(" "),
            "list chain ip kube2iam prerouting"
        );
        let rule = spec("eth0").rule_expression();
        let args = add_rule_args(&rule);
        assert_eq!(args.len(), 6);
        assert_eq!(args[5], rule.as_str());
    }

    proptest! {
        #[test]
        fn prop_normalize_replaces_only_wildcards(name in ".*") {
            let normalized = normalize_interface(&name);
            prop_assert!(!normalized.contains(OS_WILDCARD));
            prop_assert_eq!(normalized.chars().count(), name.chars().count());
            for (before, after) in name.chars().zip(normalized.chars()) {
                if before == OS_WILDCARD {
                    prop_assert_eq!(after, NFT_WILDCARD);
                } else {
                    prop_assert_eq!(after, before);
                }
            }
        }

        #[test]
        fn prop_render_twice_identical(
            port in 1u16..=u16::MAX,
            a in any::<[u8; 4]>(),
            iface in "[a-z]{1,8}\\+?",
            h in any::<[u8; 4]>(),
        ) {
            let address = std::net::Ipv4Addr::from(a).to_string();
            let host = std::net::Ipv4Addr::from(h).to_string();
            let s = RedirectSpec::new(port, address, iface, host);
            let (first, second) = (s.rule_expression(), s.rule_expression());
            prop_assert_eq!(first.as_str(), second.as_str());
        }
    }
}

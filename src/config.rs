use crate::core::error::{Error, Result};
use crate::core::rule::RedirectSpec;
use crate::validators;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Redirect settings as read from the config file and command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedirectConfig {
    /// Port the local agent listens on
    pub app_port: u16,
    /// Metadata service address or CIDR
    pub metadata_address: String,
    /// Ingress interface; a trailing `+` matches by prefix
    pub host_interface: String,
    /// Address of the agent; must be set explicitly
    pub host_ip: String,
    /// Append reconcile outcomes to the audit log
    pub audit: bool,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            app_port: 8181,
            metadata_address: "169.254.169.254".to_string(),
            host_interface: "docker0".to_string(),
            host_ip: String::new(),
            audit: true,
        }
    }
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub app_port: Option<u16>,
    pub metadata_address: Option<String>,
    pub host_interface: Option<String>,
    pub host_ip: Option<String>,
    pub no_audit: bool,
}

impl RedirectConfig {
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(port) = overrides.app_port {
            self.app_port = port;
        }
        if let Some(address) = overrides.metadata_address {
            self.metadata_address = address;
        }
        if let Some(iface) = overrides.host_interface {
            self.host_interface = iface;
        }
        if let Some(ip) = overrides.host_ip {
            self.host_ip = ip;
        }
        if overrides.no_audit {
            self.audit = false;
        }
    }

    /// Validates the settings and builds the [`RedirectSpec`] for the reconciler.
    ///
    /// An empty `host_ip` is passed through so the reconciler reports it as
    /// missing configuration rather than as malformed input.
    pub fn to_spec(&self) -> Result<RedirectSpec> {
        validators::validate_port(self.app_port).map_err(invalid("app_port"))?;
        validators::validate_metadata_address(&self.metadata_address)
            .map_err(invalid("metadata_address"))?;
        validators::validate_interface(&self.host_interface).map_err(invalid("host_interface"))?;
        if !self.host_ip.is_empty() {
            validators::validate_host_ip(&self.host_ip).map_err(invalid("host_ip"))?;
        }

        Ok(RedirectSpec::new(
            self.app_port,
            self.metadata_address.clone(),
            self.host_interface.clone(),
            self.host_ip.clone(),
        ))
    }
}

fn invalid(field: &'static str) -> impl FnOnce(String) -> Error {
    move |message| Error::Validation {
        field: field.to_string(),
        message,
    }
}

/// Loads the config file.
///
/// An explicit `path` must exist. Without one, the XDG default location is
/// tried and defaults are used if it is absent.
pub async fn load_config(path: Option<&Path>) -> Result<RedirectConfig> {
    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => match crate::utils::default_config_path() {
            Some(path) => (path, false),
            None => return Ok(RedirectConfig::default()),
        },
    };

    let json = match tokio::fs::read_to_string(&path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
            return Ok(RedirectConfig::default());
        }
        Err(e) => {
            let path = path.display();
            return Err(Error::Config(format!("cannot read {path}: {e}")));
        }
    };

    serde_json::from_str(&json)
        .map_err(|e| Error::Config(format!("invalid config {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RedirectConfig::default();
        assert_eq!(config.app_port, 8181);
        assert_eq!(config.metadata_address, "169.254.169.254");
        assert_eq!(config.host_interface, "docker0");
        assert!(config.host_ip.is_empty());
    }

    #[test]
    fn test_overrides_win() {
        let mut config = RedirectConfig::default();
        config.apply_overrides(ConfigOverrides {
            app_port: Some(9000),
            host_interface: Some("cali+".to_string()),
            host_ip: Some("10.0.0.5".to_string()),
            no_audit: true,
            ..ConfigOverrides::default()
        });
        assert_eq!(config.app_port, 9000);
        assert_eq!(config.host_interface, "cali+");
        assert_eq!(config.metadata_address, "169.254.169.254");
        assert!(!config.audit);
    }

    #[test]
    fn test_to_spec_rejects_bad_input() {
        let config = RedirectConfig {
            metadata_address: "fd00:ec2::254".to_string(),
            ..RedirectConfig::default()
        };
        assert!(matches!(
            config.to_spec(),
            Err(Error::Validation { ref field, .. }) if field == "metadata_address"
        ));

        let config = RedirectConfig {
            host_ip: "not-an-ip".to_string(),
            ..RedirectConfig::default()
        };
        assert!(matches!(
            config.to_spec(),
            Err(Error::Validation { ref field, .. }) if field == "host_ip"
        ));
    }

    #[test]
    fn test_to_spec_keeps_empty_host_ip() {
        let spec = RedirectConfig::default().to_spec().unwrap();
        assert!(spec.host_ip.is_empty());
    }

    #[tokio::test]
    async fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"host_ip": "172.17.0.1", "app_port": 8282}}"#).unwrap();

        let config = load_config(Some(file.path())).await.unwrap();
        assert_eq!(config.host_ip, "172.17.0.1");
        assert_eq!(config.app_port, 8282);
        assert_eq!(config.host_interface, "docker0");
    }

    #[tokio::test]
    async fn test_load_rejects_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"hostIP": "172.17.0.1"}}"#).unwrap();

        let result = load_config(Some(file.path())).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let result = load_config(Some(&missing)).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}

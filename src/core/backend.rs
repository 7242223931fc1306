//! Access to the firewall engine and the host interface table
//!
//! The reconciler only talks to the outside world through [`NftBackend`] and
//! [`InterfaceLookup`], so its logic can run against in-memory fakes.

use crate::core::error::{Diagnostics, Error, Result};
use crate::elevation::{build_nft_command, locate_program};
use network_interface::{NetworkInterface, NetworkInterfaceConfig};
use std::process::Stdio;
use tracing::debug;

/// Program used when `IMDS_REDIRECT_NFT_COMMAND` is unset.
///
/// Packagers may bake in an absolute path with `IMDS_REDIRECT_SYSTEM_NFT_PATH`
/// at build time.
pub const DEFAULT_NFT_PROGRAM: &str = match option_env!("IMDS_REDIRECT_SYSTEM_NFT_PATH") {
    Some(path) => path,
    None => "nft",
};

/// Outcome of a single `nft` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NftOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// stdout followed by stderr
    pub output: String,
}

impl NftOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            success: false,
            exit_code,
            output: output.into(),
        }
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics::new(self.output.clone(), self.exit_code)
    }

    /// Whether the output reports a missing table, chain or file.
    pub fn reports_absent(&self) -> bool {
        let lower = self.output.to_lowercase();
        lower.contains("no such file or directory") || lower.contains("does not exist")
    }

    /// Whether the output reports that the object being created is already there.
    pub fn reports_exists(&self) -> bool {
        let lower = self.output.to_lowercase();
        lower.contains("file exists") || lower.contains("already exists")
    }
}

/// Runs `nft` commands
#[allow(async_fn_in_trait)]
pub trait NftBackend {
    /// Whether the management tool can be found
    fn is_available(&self) -> bool;

    /// Human-readable name of the tool, used in errors
    fn program(&self) -> &str;

    /// Runs `nft <args>` to completion.
    ///
    /// A non-zero exit is reported through [`NftOutput::success`]; `Err` is
    /// reserved for failures to start the process at all.
    async fn run(&self, args: &[String]) -> Result<NftOutput>;
}

/// Looks up host network interfaces by name
pub trait InterfaceLookup {
    fn exists(&self, name: &str) -> Result<bool>;
}

/// [`NftBackend`] that spawns the real `nft` binary
#[derive(Debug, Clone)]
pub struct NftCli {
    program: String,
}

impl NftCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Uses `IMDS_REDIRECT_NFT_COMMAND` when set, else [`DEFAULT_NFT_PROGRAM`].
    pub fn from_env() -> Self {
        match std::env::var("IMDS_REDIRECT_NFT_COMMAND") {
            Ok(program) if !program.is_empty() => Self::new(program),
            _ => Self::new(DEFAULT_NFT_PROGRAM),
        }
    }
}

impl Default for NftCli {
    fn default() -> Self {
        Self::from_env()
    }
}

impl NftBackend for NftCli {
    fn is_available(&self) -> bool {
        locate_program(&self.program).is_some()
    }

    fn program(&self) -> &str {
        &self.program
    }

    async fn run(&self, args: &[String]) -> Result<NftOutput> {
        debug!("nft {}", args.join(" "));

        let output = build_nft_command(&self.program, args)?
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(NftOutput::ok(combined))
        } else {
            Ok(NftOutput::failed(combined, output.status.code()))
        }
    }
}

/// [`InterfaceLookup`] backed by the host's interface table
#[derive(Debug, Clone, Copy, Default)]
pub struct HostInterfaces;

impl InterfaceLookup for HostInterfaces {
    fn exists(&self, name: &str) -> Result<bool> {
        let interfaces =
            NetworkInterface::show().map_err(|e| Error::InterfaceLookup(e.to_string()))?;
        Ok(interfaces.iter().any(|iface| iface.name == name))
    }
}

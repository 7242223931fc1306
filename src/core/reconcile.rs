//! Idempotent installation of the metadata redirect rule
//!
//! One reconciliation walks
//! `Start -> Validated -> TableEnsured -> ChainEnsured -> Checked -> {Installed | AlreadyPresent}`.
//! Any failing step aborts with the error; earlier steps are not undone, so the
//! table and chain may exist even if the rule could not be added.

use crate::core::backend::{HostInterfaces, InterfaceLookup, NftBackend, NftCli, NftOutput};
use crate::core::error::{Diagnostics, Error, Result};
use crate::core::rule::{self, CHAIN_NAME, RedirectSpec, RuleExpression, TABLE_NAME};
use tracing::{debug, error, info};

/// Terminal success state of a reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The rule was missing and has been appended
    Installed,
    /// The rule was already in the chain; nothing was changed
    AlreadyPresent,
}

/// Last step a reconciliation completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Start,
    Validated,
    TableEnsured,
    ChainEnsured,
    Checked,
}

/// Drives the firewall engine towards a single redirect rule
#[derive(Debug, Clone)]
pub struct Reconciler<B, I> {
    nft: B,
    interfaces: I,
}

impl Reconciler<NftCli, HostInterfaces> {
    /// Reconciler using the real `nft` binary and host interface table
    pub fn for_host() -> Self {
        Self::new(NftCli::from_env(), HostInterfaces)
    }
}

impl<B: NftBackend, I: InterfaceLookup> Reconciler<B, I> {
    pub fn new(nft: B, interfaces: I) -> Self {
        Self { nft, interfaces }
    }

    pub fn backend(&self) -> &B {
        &self.nft
    }

    pub fn interfaces(&self) -> &I {
        &self.interfaces
    }

    /// Checks everything that can be checked without touching the firewall.
    ///
    /// Required inputs are checked first, then the interface, then the tool.
    pub fn validate(&self, spec: &RedirectSpec) -> Result<()> {
        if spec.host_ip.is_empty() {
            return Err(Error::MissingConfiguration { field: "host_ip" });
        }
        if spec.host_interface.is_empty() {
            return Err(Error::MissingConfiguration {
                field: "host_interface",
            });
        }
        if spec.metadata_address.is_empty() {
            return Err(Error::MissingConfiguration {
                field: "metadata_address",
            });
        }
        if spec.app_port == 0 {
            return Err(Error::MissingConfiguration { field: "app_port" });
        }

        // Wildcard interfaces may name devices that do not exist yet
        if spec.has_wildcard_interface() {
            debug!(
                "Skipping existence check for wildcard interface {}",
                spec.host_interface
            );
        } else if !self.interfaces.exists(&spec.host_interface)? {
            return Err(Error::InterfaceNotFound(spec.host_interface.clone()));
        }

        if !self.nft.is_available() {
            return Err(Error::ToolUnavailable {
                program: self.nft.program().to_string(),
            });
        }

        Ok(())
    }

    /// Runs nft, folding spawn failures into a failed output so each step can
    /// report them with its own error kind.
    async fn exec(&self, args: &[String]) -> Result<NftOutput> {
        match self.nft.run(args).await {
            Ok(output) => Ok(output),
            Err(Error::Io(e)) => {
                let diagnostics = Diagnostics::spawn_failure(&e);
                Ok(NftOutput::failed(diagnostics.output, None))
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure(&self, object: &'static str, args: &[String]) -> Result<()> {
        let output = self.exec(args).await?;
        if output.success || output.reports_exists() {
            debug!("nftables {object} ensured");
            Ok(())
        } else {
            Err(Error::Provisioning {
                object,
                diagnostics: output.diagnostics(),
            })
        }
    }

    /// Creates the IPv4 table. Issued on every call; `nft add` leaves an
    /// existing table alone.
    pub async fn ensure_table(&self) -> Result<()> {
        self.ensure("table", &rule::add_table_args()).await
    }

    /// Creates the chain bound to the NAT pre-routing hook.
    pub async fn ensure_chain(&self) -> Result<()> {
        self.ensure("chain", &rule::add_chain_args()).await
    }

    /// Whether `rule` is already in the chain. A missing chain counts as "no".
    pub async fn rule_present(&self, rule: &RuleExpression) -> Result<bool> {
        let output = self.exec(&rule::list_chain_args()).await?;
        if output.success {
            return Ok(rule.is_listed_in(&output.output));
        }
        if output.reports_absent() {
            debug!("Chain {TABLE_NAME}/{CHAIN_NAME} not found, treating rule as absent");
            return Ok(false);
        }
        Err(Error::Query(output.diagnostics()))
    }

    async fn append(&self, rule: &RuleExpression) -> Result<ReconcileOutcome> {
        let output = self.exec(&rule::add_rule_args(rule)).await?;
        if output.success {
            Ok(ReconcileOutcome::Installed)
        } else {
            Err(Error::Install(output.diagnostics()))
        }
    }

    async fn run_steps(&self, spec: &RedirectSpec, stage: &mut Stage) -> Result<ReconcileOutcome> {
        self.validate(spec)?;
        *stage = Stage::Validated;

        self.ensure_table().await?;
        *stage = Stage::TableEnsured;

        self.ensure_chain().await?;
        *stage = Stage::ChainEnsured;

        let rule = spec.rule_expression();
        let present = self.rule_present(&rule).await?;
        *stage = Stage::Checked;

        if present {
            Ok(ReconcileOutcome::AlreadyPresent)
        } else {
            self.append(&rule).await
        }
    }

    /// Ensures exactly one redirect rule for `spec` exists.
    ///
    /// Not safe against a concurrent reconciler on the same host: two callers
    /// may both see the rule missing and both append it.
    pub async fn reconcile(&self, spec: &RedirectSpec) -> Result<ReconcileOutcome> {
        let mut stage = Stage::Start;
        let result = self.run_steps(spec, &mut stage).await;
        match &result {
            Ok(outcome) => info!(
                outcome = %outcome,
                "Redirect {}:{} -> {}:{} via {}",
                spec.metadata_address,
                rule::METADATA_PORT,
                spec.host_ip,
                spec.app_port,
                spec.host_interface,
            ),
            Err(e) => error!(after = %stage, "Redirect reconciliation failed: {e}"),
        }
        result
    }

    /// Validates `spec` and reports whether its rule is installed, without
    /// creating anything.
    pub async fn status(&self, spec: &RedirectSpec) -> Result<bool> {
        self.validate(spec)?;
        self.rule_present(&spec.rule_expression()).await
    }
}

/// Installs the redirect rule on this host using the real `nft` binary.
pub async fn add_rule(
    app_port: u16,
    metadata_address: &str,
    host_interface: &str,
    host_ip: &str,
) -> Result<ReconcileOutcome> {
    let spec = RedirectSpec::new(app_port, metadata_address, host_interface, host_ip);
    Reconciler::for_host().reconcile(&spec).await
}

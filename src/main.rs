//! imds-redirect - metadata service redirect for node agents
//!
//! # Usage
//!
//! ```bash
//! # Install the redirect (no-op if already present)
//! imds-redirect apply --host-ip 10.0.0.5 --host-interface cali+ --app-port 8181
//!
//! # Report whether the rule is installed, without changing anything
//! imds-redirect status --host-ip 10.0.0.5 --host-interface cali+
//!
//! # Print the rule and the nft commands apply would run
//! imds-redirect render --host-ip 10.0.0.5
//! ```

use clap::{Args, Parser, Subcommand};
use imds_redirect::config::{self, ConfigOverrides};
use imds_redirect::core::error::NftablesErrorPattern;
use imds_redirect::core::rule;
use imds_redirect::{Error, ReconcileOutcome, Reconciler, RedirectSpec, audit};
use shadow_rs::shadow;
use std::path::PathBuf;
use std::process::ExitCode;

shadow!(build);

#[derive(Parser)]
#[command(name = "imds-redirect")]
#[command(about = "Redirect metadata traffic to a node-local agent via nftables")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure the redirect rule is installed
    Apply(RedirectArgs),
    /// Report whether the redirect rule is installed (exit 1 if not)
    Status(RedirectArgs),
    /// Print the rule and the nft commands apply would issue
    Render(RedirectArgs),
    /// Show build information
    Version,
}

#[derive(Args)]
struct RedirectArgs {
    /// Port the local agent listens on
    #[arg(long, value_name = "PORT")]
    app_port: Option<u16>,
    /// Metadata service address or CIDR
    #[arg(long, visible_alias = "metadata-addr", value_name = "ADDRESS")]
    metadata_address: Option<String>,
    /// Ingress interface; a trailing '+' matches every interface with that prefix
    #[arg(long, value_name = "NAME")]
    host_interface: Option<String>,
    /// Address the agent is reachable on
    #[arg(long, value_name = "IP")]
    host_ip: Option<String>,
    /// JSON config file (default: XDG config dir)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Do not append to the audit log
    #[arg(long)]
    no_audit: bool,
}

impl RedirectArgs {
    async fn load(self) -> Result<(RedirectSpec, bool), Error> {
        let mut config = config::load_config(self.config.as_deref()).await?;
        config.apply_overrides(ConfigOverrides {
            app_port: self.app_port,
            metadata_address: self.metadata_address,
            host_interface: self.host_interface,
            host_ip: self.host_ip,
            no_audit: self.no_audit,
        });
        Ok((config.to_spec()?, config.audit))
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .init();

    // Steps run strictly one after another; no need for worker threads
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(handle_cli(cli.command)) {
        Ok(code) => code,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn handle_cli(command: Commands) -> Result<ExitCode, Error> {
    match command {
        Commands::Apply(args) => {
            let (spec, audit_enabled) = args.load().await?;
            let result = Reconciler::for_host().reconcile(&spec).await;
            if audit_enabled {
                audit::log_reconcile(&spec, &result).await;
            }
            match result? {
                ReconcileOutcome::Installed => {
                    println!("✓ Redirect rule installed: {}", spec.rule_expression());
                }
                ReconcileOutcome::AlreadyPresent => {
                    println!("✓ Redirect rule already present");
                }
            }
        }
        Commands::Status(args) => {
            let (spec, _) = args.load().await?;
            if Reconciler::for_host().status(&spec).await? {
                println!("present: {}", spec.rule_expression());
            } else {
                println!("absent: {}", spec.rule_expression());
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Render(args) => {
            let (spec, _) = args.load().await?;
            if spec.host_ip.is_empty() {
                return Err(Error::MissingConfiguration { field: "host_ip" });
            }
            let rule = spec.rule_expression();
            println!("{rule}");
            println!();
            for args in [
                rule::add_table_args(),
                rule::add_chain_args(),
                rule::list_chain_args(),
                rule::add_rule_args(&rule),
            ] {
                println!("nft {}", shell_join(&args));
            }
        }
        Commands::Version => {
            println!("{} {}", build::PROJECT_NAME, build::PKG_VERSION);
            println!(
                "commit {}{}",
                build::SHORT_COMMIT,
                if build::GIT_CLEAN { "" } else { " (dirty)" }
            );
            println!("built {} with {}", build::BUILD_TIME, build::RUST_VERSION);
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Quotes arguments for copy-pasting into a shell
fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            if arg
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '"' | '{' | '}' | ';' | '*'))
            {
                format!("'{arg}'")
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn report_error(err: &Error) {
    let translation = NftablesErrorPattern::translate(err);
    eprintln!("Error: {err}");
    if translation.user_message != err.to_string() {
        eprintln!("  {}", translation.user_message);
    }
    for suggestion in &translation.suggestions {
        eprintln!("  - {suggestion}");
    }
    if let Some(url) = &translation.help_url {
        eprintln!("  See: {url}");
    }
}

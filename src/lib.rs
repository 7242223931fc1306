//! imds-redirect - metadata service redirect for node agents
//!
//! Installs a single nftables DNAT rule that sends TCP traffic for the cloud
//! metadata address on port 80, arriving on a host interface, to a local
//! agent. Running it again is a no-op.
//!
//! # Architecture
//!
//! - [`core`] - Rule rendering, the `nft` seam and the reconciler
//! - [`config`] - Config file loading and validation into a redirect spec
//! - [`validators`] - Input validation
//! - [`elevation`] - Running `nft` with the required privileges
//! - [`audit`] - Audit log of reconciliations
//! - [`utils`] - XDG directories
//!
//! # Example
//!
//! ```no_run
//! use imds_redirect::{Reconciler, RedirectSpec};
//!
//! # async fn example() -> imds_redirect::Result<()> {
//! let spec = RedirectSpec::new(8181, "169.254.169.254", "cali+", "10.0.0.5");
//! let outcome = Reconciler::for_host().reconcile(&spec).await?;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod elevation;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use crate::core::error::{Error, Result};
pub use crate::core::reconcile::{ReconcileOutcome, Reconciler, add_rule};
pub use crate::core::rule::{RedirectSpec, RuleExpression};

//! Core redirect functionality
//!
//! - [`rule`]: Redirect spec, interface normalization and rule rendering
//! - [`backend`]: Seams to `nft` and the host interface table
//! - [`reconcile`]: The idempotent reconciliation itself
//! - [`error`]: Error types and operator-facing translations

pub mod backend;
pub mod error;
pub mod reconcile;
pub mod rule;

#[cfg(test)]
pub mod test_helpers;

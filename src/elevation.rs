//! Privilege elevation for `nft`
//!
//! The redirect rule lives in the kernel's NAT table, so every `nft` call
//! needs `CAP_NET_ADMIN`. Node agents normally run as root and execute `nft`
//! directly; when they do not, the command is wrapped in an elevation helper.
//!
//! # Elevation Strategy
//!
//! 1. `IMDS_REDIRECT_NO_ELEVATION` set: run `nft` directly (tests, capability-granted agents)
//! 2. Running as root: run `nft` directly
//! 3. `IMDS_REDIRECT_ELEVATION_METHOD=sudo|run0`: use that helper
//! 4. Otherwise prefer `run0` (no SUID), fall back to `sudo`
//!
//! There is no interactive (pkexec) path; the reconciler runs unattended.
//!
//! # Security
//!
//! - Only `nft` is ever elevated
//! - Arguments are passed as argv, never through a shell

use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Error type for privilege elevation operations
#[derive(Debug, thiserror::Error)]
pub enum ElevationError {
    /// Requested elevation method is not available (binary not found)
    #[error("Elevation method '{0}' is not available (binary not found)")]
    MethodNotAvailable(String),

    /// Invalid value for `IMDS_REDIRECT_ELEVATION_METHOD`
    #[error("Invalid IMDS_REDIRECT_ELEVATION_METHOD '{0}'. Valid options: sudo, run0")]
    InvalidMethod(String),

    /// Not root and neither run0 nor sudo is installed
    #[error("Not running as root and neither run0 nor sudo is available")]
    NoElevationAvailable,
}

/// Regular file with at least one execute bit set
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// Resolves a program name to an executable path.
///
/// Names containing a `/` are checked as paths; bare names are searched in `PATH`.
pub fn locate_program(name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let path = Path::new(name);
        return is_executable(path).then(|| path.to_path_buf());
    }

    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths).find_map(|dir| {
            let full_path = dir.join(name);
            if is_executable(&full_path) {
                Some(full_path)
            } else {
                None
            }
        })
    })
}

fn binary_exists(name: &str) -> bool {
    locate_program(name).is_some()
}

fn wrapped(helper: &str, program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(helper);
    cmd.arg(program).args(args);
    cmd
}

/// Builds the command that runs `program` (an nft binary) with `args`,
/// elevated if required.
pub fn build_nft_command(program: &str, args: &[String]) -> Result<Command, ElevationError> {
    // 1. Explicit opt-out
    if std::env::var_os("IMDS_REDIRECT_NO_ELEVATION").is_some() {
        let mut cmd = Command::new(program);
        cmd.args(args);
        return Ok(cmd);
    }

    // 2. Direct root execution
    if nix::unistd::getuid().is_root() {
        let mut cmd = Command::new(program);
        cmd.args(args);
        return Ok(cmd);
    }

    // 3. Explicit elevation method override (sudoers NOPASSWD setups)
    if let Ok(method) = std::env::var("IMDS_REDIRECT_ELEVATION_METHOD") {
        let method = method.to_lowercase();
        if !method.is_empty() {
            return match method.as_str() {
                "sudo" | "run0" => {
                    if !binary_exists(&method) {
                        return Err(ElevationError::MethodNotAvailable(method));
                    }
                    Ok(wrapped(&method, program, args))
                }
                _ => Err(ElevationError::InvalidMethod(method)),
            };
        }
    }

    // 4. Automatic detection
    if binary_exists("run0") {
        return Ok(wrapped("run0", program, args));
    }
    if binary_exists("sudo") {
        return Ok(wrapped("sudo", program, args));
    }
    Err(ElevationError::NoElevationAvailable)
}

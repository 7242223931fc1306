use std::fmt;
use thiserror::Error;

/// Engine output captured from a failed `nft` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    /// Combined stdout and stderr
    pub output: String,
    /// `None` when the process was killed or never started
    pub exit_code: Option<i32>,
}

impl Diagnostics {
    pub fn new(output: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            output: output.into(),
            exit_code,
        }
    }

    /// Diagnostics for an `nft` process that could not be spawned at all
    pub fn spawn_failure(err: &std::io::Error) -> Self {
        Self::new(format!("failed to spawn nft: {err}"), None)
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let output = self.output.trim();
        match self.exit_code {
            Some(code) => write!(f, "exit status {code} (output: {output})"),
            None => write!(f, "{output}"),
        }
    }
}

/// Core error types for imds-redirect
#[derive(Debug, Error)]
pub enum Error {
    /// A required input was empty
    #[error("Missing configuration: {field} must be set")]
    MissingConfiguration { field: &'static str },

    /// A non-wildcard host interface does not exist on this host
    #[error("Host interface not found: {0}")]
    InterfaceNotFound(String),

    /// The host interface table could not be enumerated
    #[error("Failed to enumerate host interfaces: {0}")]
    InterfaceLookup(String),

    /// The nft binary is not locatable
    #[error("nft command not found: {program}")]
    ToolUnavailable { program: String },

    /// Table or chain creation failed for a reason other than already-exists
    #[error("Failed to create nftables {object}: {diagnostics}")]
    Provisioning {
        object: &'static str,
        diagnostics: Diagnostics,
    },

    /// Listing the chain failed for a reason other than the chain being absent
    #[error("Failed to check if rule exists: {0}")]
    Query(Diagnostics),

    /// Appending the rule failed
    #[error("Failed to add nftables rule: {0}")]
    Install(Diagnostics),

    /// Input validation failed
    #[error("Validation error in {field}: {message}")]
    Validation { field: String, message: String },

    /// Configuration file unreadable or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Privilege escalation unavailable
    #[error("Elevation error: {0}")]
    Elevation(#[from] crate::elevation::ElevationError),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Raw engine output carried by this error, if any
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            Self::Provisioning { diagnostics, .. } => Some(diagnostics),
            Self::Query(diagnostics) | Self::Install(diagnostics) => Some(diagnostics),
            _ => None,
        }
    }
}

/// Represents a translated error with helpful context
#[derive(Debug, Clone)]
pub struct ErrorTranslation {
    pub user_message: String,
    pub suggestions: Vec<String>,
    pub help_url: Option<String>,
}

impl ErrorTranslation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            user_message: message.into(),
            suggestions: Vec::new(),
            help_url: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_help(mut self, url: impl Into<String>) -> Self {
        self.help_url = Some(url.into());
        self
    }
}

/// Database of nftables error patterns and their translations
pub struct NftablesErrorPattern;

impl NftablesErrorPattern {
    /// Translates an [`Error`] into operator-facing hints.
    pub fn translate(err: &Error) -> ErrorTranslation {
        match err {
            Error::MissingConfiguration { field } => {
                let flag = field.replace('_', "-");
                ErrorTranslation::new(format!("{field} is required"))
                    .with_suggestion(format!("Pass --{flag} or set it in the config file"))
            }
            Error::InterfaceNotFound(name) => {
                ErrorTranslation::new(format!("Interface '{name}' does not exist on this host"))
                    .with_suggestion("Check available interfaces: ip link show")
                    .with_suggestion("Use a trailing '+' (e.g. cali+) to match future interfaces")
            }
            Error::ToolUnavailable { .. } => Self::match_error("command not found: nft"),
            _ => match err.diagnostics() {
                Some(diagnostics) => Self::match_error(&diagnostics.output),
                None => ErrorTranslation::new(err.to_string()),
            },
        }
    }

    /// Matches an error message against known patterns and returns a user-friendly translation.
    pub fn match_error(msg: &str) -> ErrorTranslation {
        let lower = msg.to_lowercase();

        // Permission errors
        if lower.contains("permission denied") || lower.contains("operation not permitted") {
            return ErrorTranslation::new("Insufficient permissions to modify firewall rules")
                .with_suggestion("Run as root or grant CAP_NET_ADMIN to the agent")
                .with_suggestion("Or set IMDS_REDIRECT_ELEVATION_METHOD=sudo (NOPASSWD for nft)")
                .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Quick_reference-nftables_in_10_minutes");
        }

        // Missing nftables
        if lower.contains("command not found") || lower.contains("failed to spawn nft") {
            return ErrorTranslation::new("nftables is not installed or not found in PATH")
                .with_suggestion("Install nftables: sudo apt install nftables  (Debian/Ubuntu)")
                .with_suggestion("Or: sudo dnf install nftables  (Fedora/RHEL)")
                .with_suggestion("Or point IMDS_REDIRECT_NFT_COMMAND at the nft binary")
                .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Main_Page");
        }

        // NAT support missing in the kernel
        if lower.contains("could not process rule")
            && (lower.contains("no such file") || lower.contains("not supported"))
        {
            return ErrorTranslation::new("The kernel rejected the NAT chain or rule")
                .with_suggestion("Load the NAT modules: sudo modprobe nft_nat nft_chain_nat")
                .with_suggestion("Check kernel modules: lsmod | grep nf_tables")
                .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Performing_Network_Address_Translation_(NAT)");
        }

        // Syntax errors
        if lower.contains("syntax error") {
            return ErrorTranslation::new("nft rejected the redirect rule syntax")
                .with_suggestion("Check that the metadata address and host IP are IPv4 addresses")
                .with_suggestion("Verify the app port is between 1 and 65535")
                .with_help(
                    "https://wiki.nftables.org/wiki-nftables/index.php/Simple_rule_management",
                );
        }

        // Resource busy
        if lower.contains("resource busy") || lower.contains("device or resource busy") {
            return ErrorTranslation::new("Firewall resource is busy")
                .with_suggestion("Another process may be modifying nftables")
                .with_suggestion("Wait a moment and try again");
        }

        // Netlink errors
        if lower.contains("netlink") {
            return ErrorTranslation::new("Communication error with kernel netlink interface")
                .with_suggestion("Check kernel modules: lsmod | grep nf_tables")
                .with_suggestion("Load nf_tables module: sudo modprobe nf_tables")
                .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Troubleshooting");
        }

        // Generic fallback
        ErrorTranslation::new(format!("Firewall error: {msg}"))
            .with_suggestion("Verify nftables is working: sudo nft list table ip kube2iam")
            .with_help("https://wiki.nftables.org/wiki-nftables/index.php/Troubleshooting")
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Shared test utilities for core module tests
//!
//! Provides in-memory stand-ins for `nft` and the host interface table.
//! This module is only compiled in test mode.

use crate::core::backend::{InterfaceLookup, NftBackend, NftOutput};
use crate::core::error::Result;
use crate::core::rule::{CHAIN_NAME, RedirectSpec, TABLE_NAME};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Mutex for tests that need exclusive access to environment variables.
///
/// # Example
///
/// ```ignore
/// let _guard = ENV_VAR_MUTEX.lock().unwrap();
/// unsafe {
///     std::env::set_var("IMDS_REDIRECT_ELEVATION_METHOD", "sudo");
/// }
/// // ... test with custom env state ...
/// unsafe {
///     std::env::remove_var("IMDS_REDIRECT_ELEVATION_METHOD");
/// }
/// ```
pub static ENV_VAR_MUTEX: Mutex<()> = Mutex::new(());

/// The eth0 redirect used by most scenario tests
pub fn eth0_spec() -> RedirectSpec {
    RedirectSpec::new(8080, "169.254.169.254", "eth0", "10.0.0.5")
}

const NO_SUCH_CHAIN: &str = "Error: No such file or directory\n\
    list chain ip kube2iam prerouting\n\
    ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^\n";

#[derive(Debug, Default)]
struct FakeState {
    table: bool,
    chain: bool,
    rules: Vec<String>,
    calls: Vec<String>,
}

/// Simulates `nft` for the four commands the reconciler issues.
///
/// Every invocation is recorded as its space-joined argument string.
/// Failures can be scripted per command prefix (e.g. `"add rule"`).
#[derive(Debug)]
pub struct FakeNft {
    available: bool,
    state: Mutex<FakeState>,
    failures: Mutex<HashMap<String, NftOutput>>,
}

impl Default for FakeNft {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeNft {
    pub fn new() -> Self {
        Self {
            available: true,
            state: Mutex::new(FakeState::default()),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// A fake whose binary cannot be found
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Makes every command starting with `prefix` return `output`.
    pub fn fail_on(self, prefix: &str, output: NftOutput) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(prefix.to_string(), output);
        self
    }

    /// Pre-populates the chain with a rule, as if installed by an earlier run
    pub fn with_rule(self, rule: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.table = true;
            state.chain = true;
            state.rules.push(rule.to_string());
        }
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of recorded calls starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// Number of rule appends, the only mutation that is not idempotent
    pub fn rule_appends(&self) -> usize {
        self.count("add rule")
    }

    pub fn rules(&self) -> Vec<String> {
        self.state.lock().unwrap().rules.clone()
    }

    pub fn has_table(&self) -> bool {
        self.state.lock().unwrap().table
    }

    pub fn has_chain(&self) -> bool {
        self.state.lock().unwrap().chain
    }

    fn listing(state: &FakeState) -> String {
        let mut out = format!(
            "table ip {TABLE_NAME} {{\n\tchain {CHAIN_NAME} {{\n\t\ttype nat hook prerouting priority dstnat - 100; policy accept;\n"
        );
        for rule in &state.rules {
            out.push_str("\t\t");
            out.push_str(rule);
            out.push('\n');
        }
        out.push_str("\t}\n}\n");
        out
    }
}

impl NftBackend for FakeNft {
    fn is_available(&self) -> bool {
        self.available
    }

    fn program(&self) -> &str {
        "fake-nft"
    }

    async fn run(&self, args: &[String]) -> Result<NftOutput> {
        let line = args.join(" ");
        let mut state = self.state.lock().unwrap();
        state.calls.push(line.clone());

        if let Some(output) = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
        {
            return Ok(output);
        }

        let output = match args.first().map(String::as_str) {
            Some("add") => match args.get(1).map(String::as_str) {
                Some("table") => {
                    state.table = true;
                    NftOutput::ok("")
                }
                Some("chain") if state.table => {
                    state.chain = true;
                    NftOutput::ok("")
                }
                Some("rule") if state.chain => {
                    if let Some(rule) = args.last() {
                        state.rules.push(rule.clone());
                    }
                    NftOutput::ok("")
                }
                _ => NftOutput::failed("Error: No such file or directory\n", Some(1)),
            },
            Some("list") if state.chain => NftOutput::ok(Self::listing(&state)),
            Some("list") => NftOutput::failed(NO_SUCH_CHAIN, Some(1)),
            _ => NftOutput::failed("Error: syntax error, unexpected command\n", Some(1)),
        };
        Ok(output)
    }
}

/// Fixed interface table that counts lookups
#[derive(Debug, Default)]
pub struct FakeInterfaces {
    names: HashSet<String>,
    lookups: AtomicUsize,
}

impl FakeInterfaces {
    pub fn with(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| (*n).to_string()).collect(),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl InterfaceLookup for FakeInterfaces {
    fn exists(&self, name: &str) -> Result<bool> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.names.contains(name))
    }
}

//! Server configuration.

use clap::Parser;
use std::time::Duration;

/// Default account name for development storage.
pub const DEFAULT_ACCOUNT: &str = "devstoreaccount1";

/// Default account key for development storage (base64 encoded).
pub const DEFAULT_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Default blob service port.
pub const DEFAULT_BLOB_PORT: u16 = 10000;

/// API version stamped on every response.
pub const DEFAULT_API_VERSION: &str = "2021-10-04";

/// Default timeout for copy-source probes, in seconds.
pub const DEFAULT_COPY_PROBE_TIMEOUT_SECS: u64 = 30;

/// Command-line arguments for the server.
#[derive(Parser, Debug, Clone)]
#[command(name = "blobcore")]
#[command(about = "Azure Blob Storage emulator core")]
#[command(version)]
pub struct Args {
    /// Host address to bind to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port for blob service.
    #[arg(long, default_value_t = DEFAULT_BLOB_PORT)]
    pub blob_port: u16,

    /// Additional storage account as `name:key` (repeatable).
    #[arg(long = "account", value_parser = parse_account)]
    pub accounts: Vec<AccountConfig>,

    /// Timeout in seconds for copy-source authorization probes.
    #[arg(long, default_value_t = DEFAULT_COPY_PROBE_TIMEOUT_SECS)]
    pub copy_probe_timeout: u64,

    /// Enable debug logging.
    #[arg(long, short = 'd')]
    pub debug: bool,

    /// Enable silent mode (minimal logging).
    #[arg(long, short = 's')]
    pub silent: bool,
}

/// Server configuration derived from command-line arguments.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host address to bind to.
    pub host: String,
    /// Port for blob service.
    pub blob_port: u16,
    /// Timeout applied to outbound copy-source requests.
    pub copy_probe_timeout: Duration,
    /// Configured accounts; the development account is always first.
    pub accounts: Vec<AccountConfig>,
}

/// Account configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountConfig {
    pub name: String,
    pub key: String,
}

impl AccountConfig {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
        }
    }
}

fn default_account() -> AccountConfig {
    AccountConfig::new(DEFAULT_ACCOUNT, DEFAULT_ACCOUNT_KEY)
}

/// Parses an `name:key` account argument.
fn parse_account(s: &str) -> Result<AccountConfig, String> {
    match s.split_once(':') {
        Some((name, key)) if !name.is_empty() && !key.is_empty() => {
            Ok(AccountConfig::new(name, key))
        }
        _ => Err(format!("expected `name:key`, got `{}`", s)),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            blob_port: DEFAULT_BLOB_PORT,
            copy_probe_timeout: Duration::from_secs(DEFAULT_COPY_PROBE_TIMEOUT_SECS),
            accounts: vec![default_account()],
        }
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let mut accounts = vec![default_account()];
        for account in args.accounts {
            if !accounts.iter().any(|a| a.name == account.name) {
                accounts.push(account);
            }
        }

        Self {
            host: args.host,
            blob_port: args.blob_port,
            copy_probe_timeout: Duration::from_secs(args.copy_probe_timeout),
            accounts,
        }
    }
}

impl Config {
    /// Returns the account key for the given account name.
    pub fn get_account_key(&self, account: &str) -> Option<&str> {
        self.accounts
            .iter()
            .find(|a| a.name == account)
            .map(|a| a.key.as_str())
    }

    /// Returns the bind address for the blob service.
    pub fn blob_bind_address(&self) -> String {
        format!("{}:{}", self.host, self.blob_port)
    }
}

//! Umbra configuration.
//!
//! Each component (`keystore`, `database`, `provider`, `rpc`, `sync`) owns the config
//! section it reads, and `UmbraConfig` is just the `toml`-deserializable aggregate of
//! them.

use std::fs::{File, OpenOptions};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, ErrorKind},
    network::Network,
};

/// Umbra configuration file name, relative to the data directory unless `-c` is given.
pub const CONFIG_FILE: &str = "umbra.toml";

/// Top-level Umbra configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UmbraConfig {
    /// The directory Umbra stores its wallet database and (by default) its keystore
    /// identity file under.
    #[serde(default = "default_datadir")]
    pub datadir: PathBuf,

    /// Which network Umbra is operating on.
    #[serde(default)]
    pub network: Network,

    /// Keystore configuration.
    #[serde(default)]
    pub keystore: KeystoreSection,

    /// Fetch provider configuration.
    #[serde(default)]
    pub provider: ProviderSection,

    /// Sync engine configuration.
    #[serde(default)]
    pub sync: SyncSection,

    /// JSON-RPC server configuration.
    #[serde(default)]
    pub rpc: RpcSection,
}

fn default_datadir() -> PathBuf {
    PathBuf::from(".umbra")
}

impl Default for UmbraConfig {
    fn default() -> Self {
        Self {
            datadir: default_datadir(),
            network: Network::default(),
            keystore: KeystoreSection::default(),
            provider: ProviderSection::default(),
            sync: SyncSection::default(),
            rpc: RpcSection::default(),
        }
    }
}

impl UmbraConfig {
    /// Renders an example configuration file with every section filled in with its
    /// default value.
    pub fn generate_example() -> String {
        toml::to_string_pretty(&UmbraConfig::default())
            .expect("UmbraConfig serializes to TOML without error")
    }

    /// The data directory, created if it does not already exist.
    pub fn datadir(&self) -> &Path {
        &self.datadir
    }

    /// Path to the wallet's SQLite database file.
    pub fn wallet_db_path(&self) -> PathBuf {
        self.datadir.join(match self.network {
            Network::Mainnet => "wallet.sqlite",
            Network::Testnet => "wallet-testnet.sqlite",
            Network::Regtest => "wallet-regtest.sqlite",
        })
    }

    /// Path to the age identity file used to encrypt key material at rest, if one was
    /// not given explicitly in `keystore.identity`.
    pub fn encryption_identity(&self) -> PathBuf {
        self.keystore
            .identity
            .clone()
            .unwrap_or_else(|| self.datadir.join("identity.age"))
    }

    /// Acquires an exclusive lock on the data directory for the lifetime of the returned
    /// guard, preventing two Umbra processes from concurrently mutating the same wallet
    /// database.
    pub fn lock_datadir(&self) -> Result<DatadirLock, Error> {
        std::fs::create_dir_all(&self.datadir).map_err(|e| ErrorKind::Init.context(e))?;
        DatadirLock::acquire(self.datadir.join(".umbra.lock"))
    }
}

/// An advisory lock on a data directory, released when dropped.
pub struct DatadirLock {
    path: PathBuf,
    _file: File,
}

impl DatadirLock {
    fn acquire(path: PathBuf) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                ErrorKind::Init.context(format!(
                    "could not acquire lock at {} (is another umbra process running?): {e}",
                    path.display()
                ))
            })?;
        Ok(Self { path, _file: file })
    }
}

impl Drop for DatadirLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Configuration for the key manager.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeystoreSection {
    /// Path to an age identity file (plain or passphrase-encrypted) used to encrypt
    /// key material at rest. Defaults to `<datadir>/identity.age`.
    pub identity: Option<PathBuf>,

    /// Number of unused sub-addresses to keep generated ahead of the highest one seen
    /// in a transaction, per account.
    #[serde(default = "default_gap_limit")]
    pub gap_limit: u64,
}

fn default_gap_limit() -> u64 {
    20
}

impl Default for KeystoreSection {
    fn default() -> Self {
        Self {
            identity: None,
            gap_limit: default_gap_limit(),
        }
    }
}

/// Which transport the fetch provider uses to talk to a remote node.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderBackend {
    /// Framed JSON-RPC-like request/response transport.
    #[default]
    Json,
    /// Bitcoin-style binary P2P transport.
    P2p,
}

/// Configuration for the fetch provider.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSection {
    /// Which transport to use.
    #[serde(default)]
    pub backend: ProviderBackend,

    /// Address of the remote node to fetch chain data from.
    #[serde(default = "default_provider_endpoint")]
    pub endpoint: String,

    /// Timeout (in seconds) for an individual request before it is retried.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of retry attempts before a request is treated as failed.
    #[serde(default = "default_provider_max_retries")]
    pub max_retries: u32,
}

fn default_provider_endpoint() -> String {
    "127.0.0.1:44440".into()
}

fn default_provider_timeout_secs() -> u64 {
    10
}

fn default_provider_max_retries() -> u32 {
    5
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            backend: ProviderBackend::default(),
            endpoint: default_provider_endpoint(),
            timeout_secs: default_provider_timeout_secs(),
            max_retries: default_provider_max_retries(),
        }
    }
}

impl ProviderSection {
    /// The configured request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Configuration for the sync engine.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSection {
    /// The block height to start scanning from for a freshly-created wallet. When left
    /// unset, a new wallet's effective creation height is `max(0, tip - 100)` at the
    /// time it is created, computed by [`SyncSection::creation_height`].
    #[serde(default)]
    pub birthday_height: Option<u32>,

    /// Number of blocks processed between persisting `sync_state` to disk.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Whether to stop the sync engine entirely when a reorg is detected, rather than
    /// automatically rewinding and resuming.
    #[serde(default)]
    pub stop_on_reorg: bool,

    /// Whether to retain `tx_keys` rows (the ephemeral per-output public keys) after a
    /// block has been fully processed, rather than discarding them once spendability has
    /// been determined. Needed only by wallets that want to recompute view tags after
    /// the fact; left off by default to keep the database small.
    #[serde(default)]
    pub retain_tx_keys: bool,
}

fn default_batch_size() -> u32 {
    50
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            birthday_height: None,
            batch_size: default_batch_size(),
            stop_on_reorg: false,
            retain_tx_keys: false,
        }
    }
}

impl SyncSection {
    /// The effective creation height to start scanning from for a wallet created right
    /// now, given the chain's current tip: the configured `birthday_height` if one was
    /// set explicitly, otherwise `max(0, tip - 100)`.
    pub fn creation_height(&self, tip: u32) -> u32 {
        self.birthday_height.unwrap_or_else(|| tip.saturating_sub(100))
    }
}

/// Configuration for a single JSON-RPC basic-auth user.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RpcAuthSection {
    /// Username.
    pub user: String,
    /// Bare password. Mutually exclusive with `pwhash`.
    pub password: Option<SecretString>,
    /// Pre-hashed password, as produced by the `add-rpc-user` subcommand. Mutually
    /// exclusive with `password`.
    pub pwhash: Option<String>,
}

/// Configuration for the JSON-RPC server.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RpcSection {
    /// Addresses to bind the JSON-RPC HTTP server to.
    #[serde(default = "default_rpc_bind")]
    pub bind: Vec<SocketAddr>,

    /// Per-request timeout, in seconds.
    #[serde(default = "default_rpc_timeout_secs")]
    pub timeout_secs: u64,

    /// Basic-auth users allowed to access the RPC server. If empty, the server refuses
    /// all requests (fail closed rather than fail open).
    #[serde(default)]
    pub auth: Vec<RpcAuthSection>,
}

fn default_rpc_bind() -> Vec<SocketAddr> {
    vec!["127.0.0.1:8766".parse().expect("valid socket address")]
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

impl Default for RpcSection {
    fn default() -> Self {
        Self {
            bind: default_rpc_bind(),
            timeout_secs: default_rpc_timeout_secs(),
            auth: Vec::new(),
        }
    }
}

impl RpcSection {
    /// The configured request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

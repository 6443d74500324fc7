use std::net::SocketAddr;
use std::path::PathBuf;

use umbra::config::{ProviderBackend, UmbraConfig};
use umbra::network::Network;

#[test]
fn default_config_has_expected_values() {
    let config = UmbraConfig::default();

    assert_eq!(config.datadir, PathBuf::from(".umbra"));
    assert_eq!(config.network, Network::Mainnet);
    assert_eq!(config.keystore.identity, None);
    assert_eq!(config.keystore.gap_limit, 20);
    assert_eq!(config.provider.backend, ProviderBackend::Json);
    assert_eq!(config.provider.endpoint, "127.0.0.1:44440");
    assert_eq!(config.provider.timeout_secs, 10);
    assert_eq!(config.provider.max_retries, 5);
    assert_eq!(config.sync.birthday_height, None);
    assert_eq!(config.sync.creation_height(5_000), 4_900);
    assert_eq!(config.sync.creation_height(50), 0);
    assert_eq!(config.sync.batch_size, 50);
    assert!(!config.sync.stop_on_reorg);
    assert!(!config.sync.retain_tx_keys);
    assert_eq!(
        config.rpc.bind,
        vec!["127.0.0.1:8766".parse::<SocketAddr>().unwrap()]
    );
    assert_eq!(config.rpc.timeout_secs, 30);
    assert!(config.rpc.auth.is_empty());
}

#[test]
fn empty_toml_deserializes_to_defaults() {
    let config: UmbraConfig = toml::from_str("").expect("empty document uses all defaults");
    let default_config = UmbraConfig::default();

    assert_eq!(config.datadir, default_config.datadir);
    assert_eq!(config.network, default_config.network);
    assert_eq!(config.rpc.bind, default_config.rpc.bind);
}

#[test]
fn deserializes_full_config() {
    let toml_content = r#"
datadir = "/tmp/my-umbra-wallet"
network = "testnet"

[keystore]
identity = "/tmp/my-umbra-wallet/custom_identity.age"
gap_limit = 40

[provider]
backend = "p2p"
endpoint = "198.51.100.7:8233"
timeout_secs = 20
max_retries = 3

[sync]
birthday_height = 2100000
batch_size = 100
stop_on_reorg = true
retain_tx_keys = true

[rpc]
bind = ["127.0.0.1:28766"]
timeout_secs = 15

[[rpc.auth]]
user = "alice"
password = "hunter2"
"#;

    let config: UmbraConfig = toml::from_str(toml_content).expect("valid config parses");

    assert_eq!(config.datadir, PathBuf::from("/tmp/my-umbra-wallet"));
    assert_eq!(config.network, Network::Testnet);
    assert_eq!(
        config.keystore.identity,
        Some(PathBuf::from("/tmp/my-umbra-wallet/custom_identity.age"))
    );
    assert_eq!(config.keystore.gap_limit, 40);
    assert_eq!(config.provider.backend, ProviderBackend::P2p);
    assert_eq!(config.provider.endpoint, "198.51.100.7:8233");
    assert_eq!(config.provider.timeout_secs, 20);
    assert_eq!(config.provider.max_retries, 3);
    assert_eq!(config.sync.birthday_height, Some(2100000));
    assert_eq!(config.sync.creation_height(9_999_999), 2_100_000);
    assert_eq!(config.sync.batch_size, 100);
    assert!(config.sync.stop_on_reorg);
    assert!(config.sync.retain_tx_keys);
    assert_eq!(
        config.rpc.bind,
        vec!["127.0.0.1:28766".parse::<SocketAddr>().unwrap()]
    );
    assert_eq!(config.rpc.timeout_secs, 15);
    assert_eq!(config.rpc.auth.len(), 1);
    assert_eq!(config.rpc.auth[0].user, "alice");
    assert!(config.rpc.auth[0].pwhash.is_none());
}

#[test]
fn rejects_unknown_top_level_key() {
    let result: Result<UmbraConfig, _> = toml::from_str("unknown_field = 1\n");
    assert!(result.is_err());
}

#[test]
fn rejects_unknown_section_key() {
    let result: Result<UmbraConfig, _> = toml::from_str("[rpc]\nbogus = true\n");
    assert!(result.is_err());
}

#[test]
fn rejects_invalid_network() {
    let result: Result<UmbraConfig, _> = toml::from_str("network = \"not-a-network\"\n");
    assert!(result.is_err());
}

#[test]
fn rejects_invalid_bind_address() {
    let result: Result<UmbraConfig, _> = toml::from_str("[rpc]\nbind = [\"not-an-address\"]\n");
    assert!(result.is_err());
}

#[test]
fn generated_example_round_trips() {
    let example = UmbraConfig::generate_example();
    let config: UmbraConfig = toml::from_str(&example).expect("generated example re-parses");
    assert_eq!(config.datadir, UmbraConfig::default().datadir);
}

#[test]
fn wallet_db_path_is_network_specific() {
    let mut config = UmbraConfig {
        datadir: PathBuf::from("/tmp/umbra-test"),
        ..UmbraConfig::default()
    };

    config.network = Network::Mainnet;
    assert_eq!(
        config.wallet_db_path(),
        PathBuf::from("/tmp/umbra-test/wallet.sqlite")
    );

    config.network = Network::Testnet;
    assert_eq!(
        config.wallet_db_path(),
        PathBuf::from("/tmp/umbra-test/wallet-testnet.sqlite")
    );

    config.network = Network::Regtest;
    assert_eq!(
        config.wallet_db_path(),
        PathBuf::from("/tmp/umbra-test/wallet-regtest.sqlite")
    );
}

#[test]
fn encryption_identity_defaults_under_datadir() {
    let config = UmbraConfig {
        datadir: PathBuf::from("/tmp/umbra-test"),
        ..UmbraConfig::default()
    };

    assert_eq!(
        config.encryption_identity(),
        PathBuf::from("/tmp/umbra-test/identity.age")
    );
}

#[test]
fn encryption_identity_honors_explicit_keystore_identity() {
    let mut config = UmbraConfig {
        datadir: PathBuf::from("/tmp/umbra-test"),
        ..UmbraConfig::default()
    };
    config.keystore.identity = Some(PathBuf::from("/elsewhere/identity.age"));

    assert_eq!(
        config.encryption_identity(),
        PathBuf::from("/elsewhere/identity.age")
    );
}

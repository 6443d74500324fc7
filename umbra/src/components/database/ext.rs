//! Documentation of Umbra's wallet database structure.
//!
//! Unlike an extension-table approach (which would layer a handful of app-specific
//! tables on top of an existing upstream schema), Umbra owns its entire schema: there
//! is no upstream crate providing BLSCT wallet persistence. The
//! constants below document the tables `migrations` produces; they are not used at
//! runtime, but are checked against in `super::tests` to pin the expected structure.

#![allow(dead_code)]

pub(in crate::components) mod migrations;

pub(crate) const TABLE_WALLET_METADATA: &str = r#"
CREATE TABLE wallet_metadata (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    network_type TEXT NOT NULL,
    birthday_height INTEGER NOT NULL,
    created_at TEXT NOT NULL
)
"#;

pub(crate) const TABLE_MASTER_SEED: &str = r#"
CREATE TABLE master_seed (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    encrypted_seed BLOB NOT NULL
)
"#;

pub(crate) const TABLE_VIEW_KEY: &str = r#"
CREATE TABLE view_key (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    view_sk BLOB NOT NULL,
    view_pub BLOB NOT NULL
)
"#;

pub(crate) const TABLE_SPEND_KEY: &str = r#"
CREATE TABLE spend_key (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    encrypted_spend_sk BLOB NOT NULL,
    spend_pub BLOB NOT NULL
)
"#;

pub(crate) const TABLE_HD_CHAIN: &str = r#"
CREATE TABLE hd_chain (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    next_account INTEGER NOT NULL DEFAULT 0
)
"#;

pub(crate) const TABLE_SUB_ADDRESSES: &str = r#"
CREATE TABLE sub_addresses (
    account INTEGER NOT NULL,
    address_index INTEGER NOT NULL,
    spend_pub BLOB NOT NULL,
    view_pub BLOB NOT NULL,
    PRIMARY KEY (account, address_index)
)
"#;

pub(crate) const TABLE_SUB_ADDRESS_POOL: &str = r#"
CREATE TABLE sub_address_pool (
    account INTEGER PRIMARY KEY,
    gap_limit INTEGER NOT NULL DEFAULT 20
)
"#;

pub(crate) const TABLE_SUB_ADDRESS_COUNTER: &str = r#"
CREATE TABLE sub_address_counter (
    account INTEGER PRIMARY KEY,
    highest_generated INTEGER NOT NULL DEFAULT 0,
    highest_used INTEGER NOT NULL DEFAULT -1
)
"#;

pub(crate) const TABLE_KEYS: &str = r#"
CREATE TABLE keys (
    hash_id BLOB PRIMARY KEY,
    account INTEGER NOT NULL,
    address_index INTEGER NOT NULL
)
"#;

pub(crate) const TABLE_OUT_KEYS: &str = r#"
CREATE TABLE out_keys (
    one_time_spend_pub BLOB PRIMARY KEY,
    txid BLOB NOT NULL,
    output_index INTEGER NOT NULL
)
"#;

pub(crate) const TABLE_CRYPTED_KEYS: &str = r#"
CREATE TABLE crypted_keys (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    encrypted_blob BLOB NOT NULL
)
"#;

pub(crate) const TABLE_CRYPTED_OUT_KEYS: &str = r#"
CREATE TABLE crypted_out_keys (
    txid BLOB NOT NULL,
    output_index INTEGER NOT NULL,
    encrypted_blob BLOB NOT NULL,
    PRIMARY KEY (txid, output_index)
)
"#;

pub(crate) const TABLE_TX_KEYS: &str = r#"
CREATE TABLE tx_keys (
    height INTEGER NOT NULL,
    txid BLOB NOT NULL,
    output_index INTEGER NOT NULL,
    ephemeral_pub BLOB NOT NULL,
    PRIMARY KEY (txid, output_index)
)
"#;

pub(crate) const TABLE_BLOCK_HASHES: &str = r#"
CREATE TABLE block_hashes (
    height INTEGER PRIMARY KEY,
    hash BLOB NOT NULL
)
"#;

pub(crate) const TABLE_SYNC_STATE: &str = r#"
CREATE TABLE sync_state (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    synced_height INTEGER,
    synced_hash BLOB,
    updated_at TEXT NOT NULL
)
"#;

pub(crate) const TABLE_ENCRYPTION_METADATA: &str = r#"
CREATE TABLE encryption_metadata (
    id INTEGER PRIMARY KEY CHECK (id = 0),
    is_encrypted INTEGER NOT NULL DEFAULT 0,
    age_recipients BLOB
)
"#;

pub(crate) const TABLE_WALLET_OUTPUTS: &str = r#"
CREATE TABLE wallet_outputs (
    txid BLOB NOT NULL,
    output_index INTEGER NOT NULL,
    account INTEGER NOT NULL,
    address_index INTEGER NOT NULL,
    amount INTEGER NOT NULL,
    memo TEXT,
    one_time_spend_pub BLOB NOT NULL,
    output_hash BLOB NOT NULL,
    ephemeral_pub BLOB NOT NULL,
    height INTEGER,
    state INTEGER NOT NULL,
    spent_height INTEGER,
    spent_txid BLOB,
    PRIMARY KEY (txid, output_index)
)
"#;

use std::collections::HashSet;

use rusqlite::named_params;
use schemerz_rusqlite::RusqliteMigration;
use uuid::Uuid;

use super::MigrationError;
use crate::network::{self, Network};

pub(super) const MIGRATION_ID: Uuid = Uuid::from_u128(0x5a1f0e3c_9d44_4e0a_8f6b_1b1d5c1a9e42);

pub(super) struct Migration {
    pub(crate) network_type: Network,
}

impl schemerz::Migration<Uuid> for Migration {
    fn id(&self) -> Uuid {
        MIGRATION_ID
    }

    fn dependencies(&self) -> HashSet<Uuid> {
        HashSet::new()
    }

    fn description(&self) -> &'static str {
        "Creates the full Umbra wallet schema."
    }
}

impl RusqliteMigration for Migration {
    type Error = MigrationError;

    fn up(&self, transaction: &rusqlite::Transaction<'_>) -> Result<(), Self::Error> {
        transaction.execute_batch(
            "CREATE TABLE wallet_metadata (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                network_type TEXT NOT NULL,
                birthday_height INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE master_seed (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                encrypted_seed BLOB NOT NULL
            );
            CREATE TABLE view_key (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                view_sk BLOB NOT NULL,
                view_pub BLOB NOT NULL
            );
            CREATE TABLE spend_key (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                encrypted_spend_sk BLOB NOT NULL,
                spend_pub BLOB NOT NULL
            );
            CREATE TABLE hd_chain (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                next_account INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE sub_addresses (
                account INTEGER NOT NULL,
                address_index INTEGER NOT NULL,
                spend_pub BLOB NOT NULL,
                view_pub BLOB NOT NULL,
                PRIMARY KEY (account, address_index)
            );
            CREATE TABLE sub_address_pool (
                account INTEGER PRIMARY KEY,
                gap_limit INTEGER NOT NULL DEFAULT 20
            );
            CREATE TABLE sub_address_counter (
                account INTEGER PRIMARY KEY,
                highest_generated INTEGER NOT NULL DEFAULT 0,
                highest_used INTEGER NOT NULL DEFAULT -1
            );
            CREATE TABLE keys (
                hash_id BLOB PRIMARY KEY,
                account INTEGER NOT NULL,
                address_index INTEGER NOT NULL
            );
            CREATE TABLE out_keys (
                one_time_spend_pub BLOB PRIMARY KEY,
                txid BLOB NOT NULL,
                output_index INTEGER NOT NULL
            );
            CREATE TABLE crypted_keys (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                encrypted_blob BLOB NOT NULL
            );
            CREATE TABLE crypted_out_keys (
                txid BLOB NOT NULL,
                output_index INTEGER NOT NULL,
                encrypted_blob BLOB NOT NULL,
                PRIMARY KEY (txid, output_index)
            );
            CREATE TABLE tx_keys (
                height INTEGER NOT NULL,
                txid BLOB NOT NULL,
                output_index INTEGER NOT NULL,
                ephemeral_pub BLOB NOT NULL,
                PRIMARY KEY (txid, output_index)
            );
            CREATE INDEX tx_keys_height_idx ON tx_keys (height);
            CREATE TABLE block_hashes (
                height INTEGER PRIMARY KEY,
                hash BLOB NOT NULL
            );
            CREATE TABLE sync_state (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                synced_height INTEGER,
                synced_hash BLOB,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE encryption_metadata (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                is_encrypted INTEGER NOT NULL DEFAULT 0,
                age_recipients BLOB
            );
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
                gamma BLOB,
                token_id BLOB,
                height INTEGER,
                state INTEGER NOT NULL,
                spent_height INTEGER,
                spent_txid BLOB,
                PRIMARY KEY (txid, output_index)
            );
            CREATE INDEX wallet_outputs_account_idx ON wallet_outputs (account, address_index);
            CREATE INDEX wallet_outputs_height_idx ON wallet_outputs (height);
            CREATE INDEX wallet_outputs_state_idx ON wallet_outputs (state);
            CREATE INDEX wallet_outputs_output_hash_idx ON wallet_outputs (output_hash);
            CREATE INDEX wallet_outputs_token_id_idx ON wallet_outputs (token_id);",
        )?;

        transaction.execute(
            "INSERT INTO wallet_metadata (id, network_type, birthday_height, created_at)
            VALUES (0, :network_type, 0, datetime('now'))",
            named_params! {
                ":network_type": network::kind::Sql(self.network_type),
            },
        )?;

        transaction.execute(
            "INSERT INTO encryption_metadata (id, is_encrypted, age_recipients) VALUES (0, 0, NULL)",
            [],
        )?;

        transaction.execute(
            "INSERT INTO sync_state (id, synced_height, synced_hash, updated_at)
            VALUES (0, NULL, NULL, datetime('now'))",
            [],
        )?;

        transaction.execute("INSERT INTO hd_chain (id, next_account) VALUES (0, 0)", [])?;

        Ok(())
    }

    fn down(&self, _transaction: &rusqlite::Transaction<'_>) -> Result<(), Self::Error> {
        Ok(())
    }
}

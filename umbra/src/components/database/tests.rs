use super::testing::in_memory_database;
use crate::network::Network;

#[tokio::test]
async fn migrations_create_expected_schema() {
    let db = in_memory_database(Network::Regtest).await;
    let handle = db.handle().await.unwrap();

    handle.with_raw(|conn| {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_schema WHERE type = 'table' ORDER BY name")
            .unwrap();
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        for expected in [
            "wallet_metadata",
            "master_seed",
            "view_key",
            "spend_key",
            "hd_chain",
            "sub_addresses",
            "sub_address_pool",
            "sub_address_counter",
            "keys",
            "out_keys",
            "tx_keys",
            "block_hashes",
            "sync_state",
            "encryption_metadata",
            "wallet_outputs",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {expected}");
        }
    });
}

//! Test utilities for database operations.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{error::Error, network::Network, storage::Database};

/// Creates a fresh in-memory wallet database with all migrations applied, suitable for
/// unit and integration tests. Each call gets its own uniquely-named shared in-memory
/// database, so tests can run concurrently without interfering with each other.
pub(crate) async fn in_memory_database(network: Network) -> Database {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let uri = format!("file:umbra_test_{id}?mode=memory&cache=shared");

    open_at(&uri, network).await.expect("test database should open")
}

async fn open_at(uri: &str, network: Network) -> Result<Database, Error> {
    super::Database::open_at(uri, network).await
}

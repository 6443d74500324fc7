use std::fmt;

use rusqlite::OptionalExtension;
use tokio::fs;

use crate::{
    config::UmbraConfig,
    error::{Error, ErrorKind},
};

mod connection;
pub(crate) use connection::DbConnection;

mod ext;
pub(crate) use ext::migrations::MigrationError;

pub(crate) mod ops;

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;

pub(crate) type DbHandle = deadpool::managed::Object<connection::WalletManager>;

#[derive(Clone)]
pub(crate) struct Database {
    db_data_pool: connection::WalletPool,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    pub(crate) async fn open(config: &UmbraConfig) -> Result<Self, Error> {
        let path = config.wallet_db_path();
        let db_exists = fs::try_exists(&path)
            .await
            .map_err(|e| ErrorKind::Init.context(e))?;
        Self::open_inner(path.to_string_lossy().as_ref(), config.network, db_exists).await
    }

    /// Opens (or creates) a database at an arbitrary `rusqlite`-style connection string,
    /// bypassing [`UmbraConfig`] entirely. Used by the in-memory test harness, where
    /// there is no config and no file to check for prior existence.
    #[cfg(test)]
    pub(crate) async fn open_at(uri: &str, network: crate::network::Network) -> Result<Self, Error> {
        Self::open_inner(uri, network, false).await
    }

    async fn open_inner(path: &str, network: crate::network::Network, db_exists: bool) -> Result<Self, Error> {
        let db_data_pool = connection::pool(path, network)?;
        let database = Self { db_data_pool };
        let handle = database.handle().await?;

        if db_exists {
            handle.with_raw(|conn| {
                let network_type = conn
                    .query_row(
                        "SELECT network_type FROM wallet_metadata WHERE id = 0",
                        [],
                        |row| row.get::<_, crate::network::kind::Sql>("network_type"),
                    )
                    .optional()
                    .map_err(|e| ErrorKind::Init.context(e))?;

                match network_type {
                    Some(crate::network::kind::Sql(stored)) if stored == network => Ok(()),
                    Some(_) => Err(ErrorKind::Init
                        .context("wallet database network does not match configuration")
                        .into()),
                    // Schema has not been created yet; migration below will initialize it.
                    None => Ok(()),
                }
            })?;

            tracing::info!("Applying latest database migrations");
        } else {
            tracing::info!("Creating empty wallet database");
        }

        handle.with_raw_mut(|conn| self::run_migrations(conn, network))?;

        Ok(database)
    }

    pub(crate) async fn handle(&self) -> Result<DbHandle, Error> {
        self.db_data_pool
            .get()
            .await
            .map_err(|e| ErrorKind::Generic.context(e).into())
    }
}

/// Applies any migrations from [`ext::migrations::all`] that have not yet run, tracked
/// by a minimal `schema_migrations` bookkeeping table.
///
/// We drive `schemerz_rusqlite::RusqliteMigration` ourselves here rather than through a
/// prebuilt `Migrator` convenience type (that pattern lives in wallet-storage crates
/// Umbra does not depend on): there is currently exactly
/// one migration, so a hand-rolled runner is simpler than wiring up `schemerz`'s full
/// dependency-graph resolver for a single node.
fn run_migrations(
    conn: &mut rusqlite::Connection,
    network_type: crate::network::Network,
) -> Result<(), Error> {
    use schemerz_rusqlite::RusqliteMigration;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (id TEXT PRIMARY KEY, applied_at TEXT NOT NULL)",
    )
    .map_err(|e| ErrorKind::Init.context(e))?;

    for migration in ext::migrations::all(network_type) {
        let id = schemerz::Migration::id(migration.as_ref()).to_string();
        let already_applied: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE id = ?1)",
                [&id],
                |row| row.get(0),
            )
            .map_err(|e| ErrorKind::Init.context(e))?;

        if already_applied {
            continue;
        }

        let tx = conn.transaction().map_err(|e| ErrorKind::Init.context(e))?;
        migration.up(&tx).map_err(|e| ErrorKind::Init.context(e))?;
        tx.execute(
            "INSERT INTO schema_migrations (id, applied_at) VALUES (?1, datetime('now'))",
            [&id],
        )
        .map_err(|e| ErrorKind::Init.context(e))?;
        tx.commit().map_err(|e| ErrorKind::Init.context(e))?;
    }

    Ok(())
}

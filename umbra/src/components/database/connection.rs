use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::error::Error;
use crate::network::Network;

pub(super) fn pool(path: impl AsRef<Path>, params: Network) -> Result<WalletPool, Error> {
    let config = deadpool_sqlite::Config::new(path.as_ref());
    let manager = WalletManager::from_config(&config, params);
    WalletPool::builder(manager)
        .config(deadpool::managed::PoolConfig::default())
        .build()
        .map_err(|e| crate::error::ErrorKind::Generic.context(e).into())
}

pub(super) type WalletPool = deadpool::managed::Pool<WalletManager>;

pub(crate) struct WalletManager {
    inner: deadpool_sqlite::Manager,
    /// Connection pools are thread-safe, but SQLite does not reliably follow the busy
    /// handler (configured by `rusqlite` to a timeout after 5s), so we explicitly guard
    /// against SQLite `DatabaseBusy` errors.
    lock: Arc<RwLock<()>>,
    params: Network,
}

impl WalletManager {
    #[must_use]
    pub fn from_config(config: &deadpool_sqlite::Config, params: Network) -> Self {
        Self {
            inner: deadpool_sqlite::Manager::from_config(config, deadpool_sqlite::Runtime::Tokio1),
            lock: Arc::new(RwLock::new(())),
            params,
        }
    }
}

impl deadpool::managed::Manager for WalletManager {
    type Type = DbConnection;
    type Error = rusqlite::Error;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let inner = self.inner.create().await?;
        inner
            .interact(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"))
            .await
            .map_err(|_| rusqlite::Error::UnwindingPanic)??;
        Ok(DbConnection {
            inner,
            lock: self.lock.clone(),
            params: self.params,
        })
    }

    async fn recycle(
        &self,
        obj: &mut Self::Type,
        metrics: &deadpool_sqlite::Metrics,
    ) -> deadpool::managed::RecycleResult<Self::Error> {
        self.inner.recycle(&mut obj.inner, metrics).await
    }
}

/// A pooled connection to the wallet database.
///
/// Unlike a `WalletRead`/`WalletWrite`-style connection implementing traits from an
/// upstream wallet-storage crate, Umbra owns its entire schema directly: there is no
/// upstream crate providing BLSCT wallet persistence, so
/// `with_raw`/`with_raw_mut` are the primary entry points, and higher-level storage
/// operations (see `super::ops`) are implemented as plain SQL against that schema.
pub(crate) struct DbConnection {
    inner: deadpool_sync::SyncWrapper<rusqlite::Connection>,
    lock: Arc<RwLock<()>>,
    params: Network,
}

impl DbConnection {
    pub(crate) fn params(&self) -> &Network {
        &self.params
    }

    pub(crate) fn with_raw<T>(&self, f: impl FnOnce(&rusqlite::Connection) -> T) -> T {
        tokio::task::block_in_place(|| {
            let _guard = self.lock.read().unwrap();
            f(self.inner.lock().unwrap().as_ref())
        })
    }

    pub(crate) fn with_raw_mut<T>(&self, f: impl FnOnce(&mut rusqlite::Connection) -> T) -> T {
        tokio::task::block_in_place(|| {
            let _guard = self.lock.write().unwrap();
            f(self.inner.lock().unwrap().as_mut())
        })
    }

    /// Runs `f` inside a single SQL transaction, committing on `Ok` and rolling back on
    /// `Err`. Every per-block UTXO mutation in the sync engine goes through this.
    pub(crate) fn with_transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> rusqlite::Result<T>,
    ) -> rusqlite::Result<T> {
        self.with_raw_mut(|conn| {
            let tx = conn.transaction()?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
    }
}

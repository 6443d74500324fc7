//! `start` subcommand

use std::sync::Arc;
use std::time::Duration;

use abscissa_core::{FrameworkError, Runnable, Shutdown, config};
use tokio::{pin, select};

use crate::{
    cli::StartCmd,
    components::{
        database::Database,
        json_rpc::JsonRpc,
        keystore::KeyStore,
        provider::{FetchProvider, json::JsonProvider, p2p::P2pProvider},
        wallet::Wallet,
    },
    config::{ProviderBackend, UmbraConfig},
    error::{Error, ErrorKind},
    prelude::*,
};

/// How long the sync loop sleeps between cycles once it has caught up with the
/// provider's reported tip.
const SYNC_POLL_INTERVAL: Duration = Duration::from_secs(30);

async fn connect_provider(config: &UmbraConfig) -> Result<Arc<dyn FetchProvider>, Error> {
    let timeout = Duration::from_secs(config.provider.timeout_secs);
    let provider: Arc<dyn FetchProvider> = match config.provider.backend {
        ProviderBackend::Json => {
            Arc::new(JsonProvider::connect(&config.provider.endpoint, timeout).await?)
        }
        ProviderBackend::P2p => Arc::new(
            P2pProvider::connect(&config.provider.endpoint, config.network, timeout).await?,
        ),
    };
    provider.connect().await?;
    Ok(provider)
}

impl StartCmd {
    async fn start(&self) -> Result<(), Error> {
        let config = APP.config();
        let _lock = config.lock_datadir()?;

        let db = Database::open(&config).await?;
        let keystore = Arc::new(KeyStore::new(&config, db.clone()).await?);
        let provider = connect_provider(&config).await?;

        let wallet = Wallet::new(
            db,
            keystore,
            provider,
            config.sync.clone(),
            config.provider.max_retries,
            config.network,
        );

        let sync_engine = wallet.sync_engine();
        let sync_task_handle = crate::spawn!("wallet sync", async move {
            sync_engine
                .background_sync(
                    SYNC_POLL_INTERVAL,
                    |progress| info!(?progress, "Sync cycle complete"),
                    |e| error!("Sync cycle failed: {e}"),
                )
                .await;
        });

        let rpc_task_handle = JsonRpc::spawn(config.rpc.clone(), wallet).await?;

        info!("Spawned Umbra tasks");

        pin!(sync_task_handle);
        pin!(rpc_task_handle);

        let res = select! {
            sync_join_result = &mut sync_task_handle => {
                sync_join_result.map_err(|e| ErrorKind::Generic.context(e))?;
                info!("Wallet sync task exited");
                Ok(())
            }

            rpc_join_result = &mut rpc_task_handle => {
                rpc_join_result.map_err(|e| ErrorKind::Generic.context(e))?;
                info!("RPC task exited");
                Ok(())
            }
        };

        info!("Exiting Umbra because an ongoing task exited; asking other tasks to stop");

        sync_task_handle.abort();
        rpc_task_handle.abort();

        info!("All tasks have been asked to stop, waiting for remaining tasks to finish");

        res
    }
}

impl Runnable for StartCmd {
    fn run(&self) {
        match abscissa_tokio::run(&APP, self.start()) {
            Ok(Ok(())) => (),
            Ok(Err(e)) => {
                eprintln!("{}", e);
                APP.shutdown_with_exitcode(Shutdown::Forced, 1);
            }
            Err(e) => {
                eprintln!("{}", e);
                APP.shutdown_with_exitcode(Shutdown::Forced, 1);
            }
        }
    }
}

impl config::Override<UmbraConfig> for StartCmd {
    fn override_config(&self, config: UmbraConfig) -> Result<UmbraConfig, FrameworkError> {
        Ok(config)
    }
}

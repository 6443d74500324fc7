//! JSON-RPC server that is compatible with `zcashd`.

use jsonrpsee::server::{RpcServiceBuilder, Server};
use tracing::info;

use crate::{
    components::{TaskHandle, wallet::Wallet},
    config::RpcSection,
    error::{Error, ErrorKind},
};

use super::methods::{RpcImpl, RpcServer as _};

pub(crate) mod authorization;
mod error;
pub(crate) use error::LegacyCode;

mod http_request_compatibility;
mod rpc_call_compatibility;

pub(crate) async fn spawn(config: RpcSection, wallet: Wallet) -> Result<TaskHandle, Error> {
    Ok(crate::spawn!("JSON-RPC", start(config, wallet)))
}

async fn start(config: RpcSection, wallet: Wallet) {
    if let Err(e) = run(config, wallet).await {
        tracing::error!("RPC server exited: {e}");
    }
}

async fn run(config: RpcSection, wallet: Wallet) -> Result<(), Error> {
    // Caller should make sure `bind` only contains a single address (for now).
    assert_eq!(config.bind.len(), 1);
    let listen_addr = config.bind[0];

    let network = wallet.network();

    // Initialize the RPC methods.
    let rpc_impl = RpcImpl::new(wallet, network);

    let http_middleware_layer = http_request_compatibility::HttpRequestMiddlewareLayer::new();
    let authorization_layer = authorization::AuthorizationLayer::new(config.auth.clone())
        .map_err(|()| ErrorKind::Init.context("rpc.auth entries must set exactly one of `password`/`pwhash`"))?;

    let http_middleware = tower::ServiceBuilder::new()
        .layer(http_middleware_layer)
        .layer(authorization_layer)
        .timeout(config.timeout());

    let rpc_middleware = RpcServiceBuilder::new()
        .rpc_logger(1024)
        .layer_fn(rpc_call_compatibility::FixRpcResponseMiddleware::new);

    let server_instance = Server::builder()
        .http_only()
        .set_http_middleware(http_middleware)
        .set_rpc_middleware(rpc_middleware)
        .build(listen_addr)
        .await
        .map_err(|e| ErrorKind::Init.context(e))?;
    let addr = server_instance
        .local_addr()
        .map_err(|e| ErrorKind::Init.context(e))?;
    info!("Opened RPC endpoint at {}", addr);

    let rpc_module = rpc_impl.into_rpc();

    server_instance.start(rpc_module).stopped().await;

    Ok(())
}

//! JSON-RPC endpoint.
//!
//! Exposes the wallet's operations over HTTP, `zcashd`-style: the wire format and the
//! `zcashd`-compatible HTTP/error-code shims are carried unchanged, but the method
//! surface is Umbra's own (`getbalance`, `sendtoaddress`, ... — see `methods.rs`).

use tracing::{info, warn};

use crate::{
    config::RpcSection,
    error::{Error, ErrorKind},
};

use super::{TaskHandle, wallet::Wallet};

mod asyncop;
pub(crate) mod methods;
pub(crate) mod server;

#[derive(Debug)]
pub(crate) struct JsonRpc {}

impl JsonRpc {
    pub(crate) async fn spawn(rpc: RpcSection, wallet: Wallet) -> Result<TaskHandle, Error> {
        if !rpc.bind.is_empty() {
            if rpc.bind.len() > 1 {
                return Err(ErrorKind::Init
                    .context("Only one RPC bind address is supported (for now)")
                    .into());
            }
            info!("Spawning RPC server");
            info!("Trying to open RPC endpoint at {}...", rpc.bind[0]);
            server::spawn(rpc, wallet).await
        } else {
            warn!("Configure `rpc.bind` to start the RPC server");
            Ok(crate::spawn!("No JSON-RPC", std::future::pending()))
        }
    }
}

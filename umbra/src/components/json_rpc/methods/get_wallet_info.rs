use documented::Documented;
use jsonrpsee::core::RpcResult;
use schemars::JsonSchema;
use serde::Serialize;

use crate::components::{json_rpc::server::LegacyCode, wallet::Wallet};

/// Response to a `getwalletinfo` RPC request.
pub(crate) type Response = RpcResult<ResultType>;

#[derive(Clone, Debug, Serialize, Documented, JsonSchema)]
pub(crate) struct ResultType {
    /// `true` if the keystore currently requires `unlockwallet` before spending.
    locked: bool,
    /// The height of the most recently persisted sync pass, or `null` before the
    /// wallet's first sync completes.
    sync_height: Option<u32>,
}

pub(crate) async fn call(wallet: &Wallet) -> Response {
    let sync_height = wallet
        .sync_height()
        .await
        .map_err(|e| LegacyCode::Wallet.with_message(e.to_string()))?;

    Ok(ResultType {
        locked: wallet.is_locked().await,
        sync_height,
    })
}

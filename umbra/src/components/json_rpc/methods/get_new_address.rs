use documented::Documented;
use jsonrpsee::core::RpcResult;
use schemars::JsonSchema;
use serde::Serialize;

use crate::components::{json_rpc::server::LegacyCode, wallet::Wallet};

/// Response to a `getnewaddress` RPC request.
pub(crate) type Response = RpcResult<ResultType>;

#[derive(Clone, Debug, Serialize, Documented, JsonSchema)]
pub(crate) struct ResultType {
    index: u64,
    address: String,
}

pub(super) const PARAM_ACCOUNT_DESC: &str = "The account to issue the new sub-address from.";

pub(crate) async fn call(wallet: &Wallet, account: i64) -> Response {
    let (index, address) = wallet
        .new_address(account)
        .await
        .map_err(|e| LegacyCode::Wallet.with_message(e.to_string()))?;

    Ok(ResultType { index, address })
}

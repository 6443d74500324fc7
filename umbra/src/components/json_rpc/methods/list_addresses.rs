use documented::Documented;
use jsonrpsee::core::RpcResult;
use schemars::JsonSchema;
use serde::Serialize;

use crate::components::{json_rpc::server::LegacyCode, wallet::Wallet};

/// Response to a `listaddresses` RPC request.
pub(crate) type Response = RpcResult<ResultType>;

#[derive(Clone, Debug, Serialize, Documented, JsonSchema)]
#[serde(transparent)]
pub(crate) struct ResultType(Vec<AddressEntry>);

#[derive(Clone, Debug, Serialize, JsonSchema)]
pub(crate) struct AddressEntry {
    account: i64,
    index: u64,
    address: String,
}

pub(crate) async fn call(wallet: &Wallet) -> Response {
    let addresses = wallet
        .list_addresses()
        .await
        .map_err(|e| LegacyCode::Wallet.with_message(e.to_string()))?;

    Ok(ResultType(
        addresses
            .into_iter()
            .map(|(account, index, address)| AddressEntry {
                account,
                index,
                address,
            })
            .collect(),
    ))
}

use documented::Documented;
use jsonrpsee::core::RpcResult;
use schemars::JsonSchema;
use serde::Serialize;

use crate::components::{json_rpc::server::LegacyCode, wallet::Wallet};

/// Response to a `gettransaction` RPC request.
pub(crate) type Response = RpcResult<ResultType>;

#[derive(Clone, Debug, Serialize, Documented, JsonSchema)]
pub(crate) struct ResultType {
    txid: String,
    outputs: Vec<OutputEntry>,
}

#[derive(Clone, Debug, Serialize, JsonSchema)]
pub(crate) struct OutputEntry {
    #[serde(rename = "vout")]
    output_index: u32,
    account: i64,
    amount: u64,
    memo: Option<String>,
    height: Option<u32>,
    spent: bool,
}

pub(crate) async fn call(wallet: &Wallet, txid: &str) -> Response {
    let txid_bytes =
        hex::decode(txid).map_err(|_| LegacyCode::InvalidParameter.with_static("Invalid txid"))?;

    let outputs = wallet
        .transaction(&txid_bytes)
        .await
        .map_err(|e| LegacyCode::Wallet.with_message(e.to_string()))?;

    if outputs.is_empty() {
        return Err(LegacyCode::InvalidAddressOrKey.with_static("Invalid or non-wallet transaction id"));
    }

    Ok(ResultType {
        txid: txid.to_string(),
        outputs: outputs
            .into_iter()
            .map(|o| OutputEntry {
                output_index: o.output_index,
                account: o.account,
                amount: o.amount,
                memo: o.memo,
                height: o.height,
                spent: !o.state.is_spendable(),
            })
            .collect(),
    })
}

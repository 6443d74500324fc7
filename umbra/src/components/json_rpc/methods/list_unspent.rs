use documented::Documented;
use jsonrpsee::core::RpcResult;
use schemars::JsonSchema;
use serde::Serialize;

use crate::{
    components::{json_rpc::server::LegacyCode, wallet::Wallet},
    storage::WalletOutput,
};

/// Response to a `listunspent` RPC request.
pub(crate) type Response = RpcResult<ResultType>;

#[derive(Clone, Debug, Serialize, Documented, JsonSchema)]
#[serde(transparent)]
pub(crate) struct ResultType(Vec<UnspentOutput>);

#[derive(Clone, Debug, Serialize, JsonSchema)]
pub(crate) struct UnspentOutput {
    txid: String,
    #[serde(rename = "vout")]
    output_index: u32,
    account: i64,
    amount: u64,
    memo: Option<String>,
    /// The token this output is denominated in (hex). `None` means the native coin.
    token_id: Option<String>,
    height: Option<u32>,
    confirmed: bool,
}

impl From<WalletOutput> for UnspentOutput {
    fn from(o: WalletOutput) -> Self {
        Self {
            txid: hex::encode(&o.txid),
            output_index: o.output_index,
            account: o.account,
            amount: o.amount,
            memo: o.memo,
            token_id: o.token_id.as_deref().map(hex::encode),
            height: o.height,
            confirmed: o.height.is_some(),
        }
    }
}

pub(super) const PARAM_ACCOUNT_DESC: &str =
    "Restrict the listing to this account. Omit to list every account.";
pub(super) const PARAM_TOKEN_ID_DESC: &str =
    "Restrict the listing to this token (hex). Omit for the native coin.";

pub(crate) async fn call(wallet: &Wallet, account: Option<i64>, token_id: Option<&str>) -> Response {
    let token_id = token_id
        .map(|t| hex::decode(t).map_err(|_| LegacyCode::InvalidParameter.with_static("Invalid token_id")))
        .transpose()?;

    let outputs = wallet
        .list_unspent(account, token_id.as_deref())
        .await
        .map_err(|e| LegacyCode::Wallet.with_message(e.to_string()))?;

    Ok(ResultType(outputs.into_iter().map(Into::into).collect()))
}

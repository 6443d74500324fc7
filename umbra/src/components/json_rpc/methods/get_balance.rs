use documented::Documented;
use jsonrpsee::core::RpcResult;
use schemars::JsonSchema;
use serde::Serialize;

use crate::components::{json_rpc::server::LegacyCode, wallet::Wallet};

/// Response to a `getbalance` RPC request.
pub(crate) type Response = RpcResult<ResultType>;

/// The wallet's confirmed and pending balance, in the smallest confidential-amount unit.
#[derive(Clone, Debug, Serialize, Documented, JsonSchema)]
pub(crate) struct ResultType {
    confirmed: u64,
    pending: u64,
}

pub(super) const PARAM_ACCOUNT_DESC: &str =
    "Restrict the balance to this account. Omit to sum every account.";
pub(super) const PARAM_TOKEN_ID_DESC: &str =
    "Restrict the balance to this token (hex). Omit for the native coin.";

pub(crate) async fn call(wallet: &Wallet, account: Option<i64>, token_id: Option<&str>) -> Response {
    let token_id = token_id
        .map(|t| hex::decode(t).map_err(|_| LegacyCode::InvalidParameter.with_static("Invalid token_id")))
        .transpose()?;

    let (confirmed, pending) = wallet
        .balance(account, token_id.as_deref())
        .await
        .map_err(|e| LegacyCode::Wallet.with_message(e.to_string()))?;

    Ok(ResultType { confirmed, pending })
}

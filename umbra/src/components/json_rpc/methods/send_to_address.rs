use documented::Documented;
use jsonrpsee::core::RpcResult;
use schemars::JsonSchema;
use serde::Serialize;

use crate::components::{json_rpc::server::LegacyCode, wallet::Wallet};

/// Response to a `sendtoaddress` RPC request.
pub(crate) type Response = RpcResult<ResultType>;

#[derive(Clone, Debug, Serialize, Documented, JsonSchema)]
pub(crate) struct ResultType {
    txid: String,
    fee: u64,
}

pub(super) const PARAM_ACCOUNT_DESC: &str = "Restrict input selection to this account.";
pub(super) const PARAM_ADDRESS_DESC: &str = "The destination address.";
pub(super) const PARAM_AMOUNT_DESC: &str = "The amount to send, in the smallest confidential-amount unit.";
pub(super) const PARAM_MEMO_DESC: &str = "An optional memo attached to the destination output.";
pub(super) const PARAM_SUBTRACT_FEE_DESC: &str =
    "Deduct the fee from the amount itself instead of adding it on top.";
pub(super) const PARAM_TOKEN_ID_DESC: &str =
    "Denominate and select inputs in this token (hex). Omit for the native coin.";

fn decode_token_id(token_id: Option<&str>) -> RpcResult<Option<[u8; 64]>> {
    let Some(token_id) = token_id else { return Ok(None) };
    let bytes = hex::decode(token_id).map_err(|_| LegacyCode::InvalidParameter.with_static("Invalid token_id"))?;
    let token_id: [u8; 64] = bytes
        .try_into()
        .map_err(|_| LegacyCode::InvalidParameter.with_static("token_id must be 64 bytes"))?;
    Ok(Some(token_id))
}

/// Builds, broadcasts and records a confidential spend.
///
/// Unlike a shielded `z_sendmany`-style call, this runs synchronously: Umbra's send
/// algorithm has no multi-step proving pipeline to background, so there is nothing
/// gained by wrapping it in an async operation id. The response still carries the
/// fields a client polling `getoperationstatus` would expect from a finished operation.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn call(
    wallet: &Wallet,
    account: Option<i64>,
    address: &str,
    amount: u64,
    memo: Option<&str>,
    subtract_fee_from_amount: bool,
    token_id: Option<&str>,
) -> Response {
    let token_id = decode_token_id(token_id)?;

    let result = wallet
        .send_transaction(account, address, amount, memo.unwrap_or(""), subtract_fee_from_amount, token_id)
        .await
        .map_err(|e| LegacyCode::Wallet.with_message(e.to_string()))?;

    Ok(ResultType {
        txid: hex::encode(result.txid),
        fee: result.fee,
    })
}

use documented::Documented;
use jsonrpsee::core::RpcResult;
use schemars::JsonSchema;
use serde::Serialize;

use crate::{address::Codec, crypto::SubAddressPubKey, network::Network};

/// Response to a `validateaddress` RPC request.
pub(crate) type Response = RpcResult<ResultType>;

#[derive(Clone, Debug, Serialize, Documented, JsonSchema)]
pub(crate) struct ResultType {
    #[serde(rename = "isvalid")]
    is_valid: bool,
    address: String,
}

pub(crate) fn call(network: Network, address: &str) -> Response {
    Ok(ResultType {
        is_valid: SubAddressPubKey::decode(network, address).is_ok(),
        address: address.to_string(),
    })
}

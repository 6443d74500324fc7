use documented::Documented;
use jsonrpsee::{core::RpcResult, types::ErrorCode as RpcErrorCode};
use schemars::JsonSchema;
use serde::Serialize;

/// Response to a `stop` RPC request.
pub(crate) type Response = RpcResult<ResultType>;

#[derive(Clone, Debug, Serialize, Documented, JsonSchema)]
#[serde(transparent)]
pub(crate) struct ResultType(&'static str);

pub(crate) fn call() -> Response {
    #[cfg(not(target_os = "windows"))]
    match nix::sys::signal::raise(nix::sys::signal::SIGINT) {
        Ok(()) => Ok(ResultType("umbra stopping")),
        Err(_) => Err(RpcErrorCode::InternalError.into()),
    }
    #[cfg(target_os = "windows")]
    Err(RpcErrorCode::MethodNotFound.into())
}

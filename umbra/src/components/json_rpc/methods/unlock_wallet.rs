use age::secrecy::SecretString;
use documented::Documented;
use jsonrpsee::core::RpcResult;
use schemars::JsonSchema;
use serde::Serialize;
use tracing::warn;

use crate::components::{json_rpc::server::LegacyCode, keystore::KeyStore};

/// Response to a `unlockwallet` RPC request.
pub(crate) type Response = RpcResult<ResultType>;

/// Empty result indicating success.
#[derive(Clone, Debug, Serialize, Documented, JsonSchema)]
#[serde(transparent)]
pub(crate) struct ResultType(());

pub(super) const PARAM_PASSPHRASE_DESC: &str =
    "The passphrase for decrypting the wallet's age identity.";
pub(super) const PARAM_TIMEOUT_DESC: &str =
    "Accepted for `zcashd` CLI compatibility; ignored. The wallet stays unlocked until \
     `lockwallet` is called explicitly.";

pub(crate) async fn call(keystore: &KeyStore, passphrase: SecretString, timeout: u64) -> Response {
    if !keystore.is_crypted() {
        return Err(LegacyCode::WalletWrongEncState.with_static(
            "Error: running with an unencrypted wallet, but unlockwallet was called.",
        ));
    }

    if timeout != 0 {
        warn!("unlockwallet: ignoring requested timeout of {timeout}s, no auto-relock is implemented");
    }

    keystore
        .unlock(passphrase)
        .await
        .map_err(|_| LegacyCode::WalletPassphraseIncorrect.with_static("Error: The wallet passphrase entered was incorrect."))?;

    Ok(ResultType(()))
}

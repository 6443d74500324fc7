use async_trait::async_trait;
use jsonrpsee::{core::RpcResult, proc_macros::rpc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::{components::wallet::Wallet, network::Network};

use super::asyncop::{AsyncOperation, ContextInfo, OperationId};

mod get_balance;
mod get_new_address;
mod get_operation;
mod get_transaction;
mod get_wallet_info;
mod help;
mod list_addresses;
mod list_operation_ids;
mod list_unspent;
mod lock_wallet;
mod send_to_address;
mod stop;
mod unlock_wallet;
mod validate_address;

#[rpc(server)]
pub(crate) trait Rpc {
    /// List all commands, or get help for a specified command.
    ///
    /// # Arguments
    /// - `command` (string, optional) The command to get help on.
    #[method(name = "help")]
    fn help(&self, command: Option<&str>) -> String;

    /// Returns the wallet's confirmed and pending balance.
    ///
    /// # Arguments
    /// - `account` (numeric, optional) Restrict the balance to this account.
    /// - `token_id` (string, optional) Restrict the balance to this token (hex).
    #[method(name = "getbalance")]
    async fn get_balance(&self, account: Option<i64>, token_id: Option<&str>) -> get_balance::Response;

    /// Returns wallet state information.
    #[method(name = "getwalletinfo")]
    async fn get_wallet_info(&self) -> get_wallet_info::Response;

    /// Returns an array of unspent outputs.
    ///
    /// # Arguments
    /// - `account` (numeric, optional) Restrict the listing to this account.
    /// - `token_id` (string, optional) Restrict the listing to this token (hex).
    #[method(name = "listunspent")]
    async fn list_unspent(&self, account: Option<i64>, token_id: Option<&str>) -> list_unspent::Response;

    /// Lists the sub-addresses this wallet has generated.
    #[method(name = "listaddresses")]
    async fn list_addresses(&self) -> list_addresses::Response;

    /// Issues a fresh never-before-used receiving sub-address.
    ///
    /// # Arguments
    /// - `account` (numeric, required) The account to issue the address from.
    #[method(name = "getnewaddress")]
    async fn get_new_address(&self, account: i64) -> get_new_address::Response;

    /// Builds, broadcasts and records a confidential spend.
    ///
    /// # Arguments
    /// - `address` (string, required) The destination address.
    /// - `amount` (numeric, required) The amount to send.
    /// - `memo` (string, optional) A memo attached to the destination output.
    /// - `account` (numeric, optional) Restrict input selection to this account.
    /// - `subtract_fee_from_amount` (bool, optional) Deduct the fee from `amount` itself.
    /// - `token_id` (string, optional) Denominate and select inputs in this token (hex).
    #[method(name = "sendtoaddress")]
    async fn send_to_address(
        &self,
        address: &str,
        amount: u64,
        memo: Option<&str>,
        account: Option<i64>,
        subtract_fee_from_amount: Option<bool>,
        token_id: Option<&str>,
    ) -> send_to_address::Response;

    /// Returns the list of operation ids currently known to the wallet.
    ///
    /// # Arguments
    /// - `status` (string, optional) Filter result by the operation's state e.g. "success".
    #[method(name = "listoperationids")]
    async fn list_operation_ids(&self, status: Option<&str>) -> list_operation_ids::Response;

    /// Get operation status and any associated result or error data.
    ///
    /// # Arguments
    /// - `operationid` (array, optional) A list of operation ids we are interested in.
    #[method(name = "getoperationstatus")]
    async fn get_operation_status(&self, operationid: Vec<OperationId>) -> get_operation::Response;

    /// Returns detailed information about in-wallet transaction `txid`.
    #[method(name = "gettransaction")]
    async fn get_transaction(&self, txid: &str) -> get_transaction::Response;

    /// Removes the wallet decryption key from memory, locking the wallet.
    #[method(name = "lockwallet")]
    async fn lock_wallet(&self) -> lock_wallet::Response;

    /// Loads the wallet decryption key into memory.
    ///
    /// # Arguments
    /// - `passphrase` (string, required)
    /// - `timeout` (numeric, required) Accepted for CLI compatibility; ignored.
    #[method(name = "unlockwallet")]
    async fn unlock_wallet(
        &self,
        passphrase: age::secrecy::SecretString,
        timeout: u64,
    ) -> unlock_wallet::Response;

    /// Checks whether a string is a valid address for this network.
    #[method(name = "validateaddress")]
    fn validate_address(&self, address: &str) -> validate_address::Response;

    /// Requests that the wallet process shut down.
    #[method(name = "stop")]
    fn stop(&self) -> stop::Response;
}

pub(crate) struct RpcImpl {
    wallet: Wallet,
    network: Network,
    async_ops: RwLock<Vec<AsyncOperation>>,
}

impl RpcImpl {
    pub(crate) fn new(wallet: Wallet, network: Network) -> Self {
        Self {
            wallet,
            network,
            async_ops: RwLock::new(Vec::new()),
        }
    }

    #[allow(dead_code)]
    async fn start_async<F, T>(&self, (context, f): (Option<ContextInfo>, F)) -> OperationId
    where
        F: Future<Output = RpcResult<T>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let mut async_ops = self.async_ops.write().await;
        let op = AsyncOperation::new(context, f).await;
        let op_id = op.operation_id().clone();
        async_ops.push(op);
        op_id
    }
}

#[async_trait]
impl RpcServer for RpcImpl {
    fn help(&self, command: Option<&str>) -> String {
        help::call(command)
    }

    async fn get_balance(&self, account: Option<i64>, token_id: Option<&str>) -> get_balance::Response {
        get_balance::call(&self.wallet, account, token_id).await
    }

    async fn get_wallet_info(&self) -> get_wallet_info::Response {
        get_wallet_info::call(&self.wallet).await
    }

    async fn list_unspent(&self, account: Option<i64>, token_id: Option<&str>) -> list_unspent::Response {
        list_unspent::call(&self.wallet, account, token_id).await
    }

    async fn list_addresses(&self) -> list_addresses::Response {
        list_addresses::call(&self.wallet).await
    }

    async fn get_new_address(&self, account: i64) -> get_new_address::Response {
        get_new_address::call(&self.wallet, account).await
    }

    async fn send_to_address(
        &self,
        address: &str,
        amount: u64,
        memo: Option<&str>,
        account: Option<i64>,
        subtract_fee_from_amount: Option<bool>,
        token_id: Option<&str>,
    ) -> send_to_address::Response {
        send_to_address::call(
            &self.wallet,
            account,
            address,
            amount,
            memo,
            subtract_fee_from_amount.unwrap_or(false),
            token_id,
        )
        .await
    }

    async fn list_operation_ids(&self, status: Option<&str>) -> list_operation_ids::Response {
        list_operation_ids::call(&self.async_ops.read().await, status).await
    }

    async fn get_operation_status(&self, operationid: Vec<OperationId>) -> get_operation::Response {
        get_operation::status(&self.async_ops.read().await, operationid).await
    }

    async fn get_transaction(&self, txid: &str) -> get_transaction::Response {
        get_transaction::call(&self.wallet, txid).await
    }

    async fn lock_wallet(&self) -> lock_wallet::Response {
        lock_wallet::call(self.wallet.keystore()).await
    }

    async fn unlock_wallet(
        &self,
        passphrase: age::secrecy::SecretString,
        timeout: u64,
    ) -> unlock_wallet::Response {
        unlock_wallet::call(self.wallet.keystore(), passphrase, timeout).await
    }

    fn validate_address(&self, address: &str) -> validate_address::Response {
        validate_address::call(self.network, address)
    }

    fn stop(&self) -> stop::Response {
        stop::call()
    }
}

//! `rpc` subcommand

use abscissa_core::{Runnable, Shutdown};
use jsonrpsee::core::{client::ClientT, params::ArrayParams};
use jsonrpsee_http_client::HttpClientBuilder;

use crate::{
    cli::RpcCliCmd,
    error::{Error, ErrorKind},
    prelude::*,
};

impl RpcCliCmd {
    async fn start(&self) -> Result<(), Error> {
        let config = APP.config();

        let bind = config
            .rpc
            .bind
            .first()
            .ok_or_else(|| ErrorKind::Generic.context("this wallet has no RPC server configured"))?;

        let client = HttpClientBuilder::default()
            .build(format!("http://{bind}"))
            .map_err(|e| ErrorKind::Connect.context(e))?;

        let mut params = ArrayParams::new();
        for param in &self.params {
            let value: serde_json::Value = serde_json::from_str(param)
                .map_err(|_| ErrorKind::Generic.context(format!("invalid parameter: {param}")))?;
            params
                .insert(value)
                .map_err(|_| ErrorKind::Generic.context(format!("invalid parameter: {param}")))?;
        }

        let response: serde_json::Value = client
            .request(&self.command, params)
            .await
            .map_err(|e| ErrorKind::Generic.context(format!("RPC request failed: {e}")))?;

        match response {
            serde_json::Value::String(s) => print!("{s}"),
            _ => serde_json::to_writer_pretty(std::io::stdout(), &response)
                .expect("response should be valid"),
        }

        Ok(())
    }
}

impl Runnable for RpcCliCmd {
    fn run(&self) {
        match abscissa_tokio::run(&APP, self.start()) {
            Ok(Ok(())) => (),
            Ok(Err(e)) => {
                eprintln!("{}", e);
                APP.shutdown_with_exitcode(Shutdown::Forced, 1);
            }
            Err(e) => {
                eprintln!("{}", e);
                APP.shutdown_with_exitcode(Shutdown::Forced, 1);
            }
        }
    }
}

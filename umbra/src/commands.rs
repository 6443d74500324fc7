//! Umbra Subcommands

use std::path::PathBuf;

use abscissa_core::{Configurable, FrameworkError, Runnable, Shutdown, config::Override};

use crate::{
    cli::{EntryPoint, UmbraCmd},
    config::{CONFIG_FILE, UmbraConfig},
    error::Error,
    prelude::*,
};

pub(crate) mod add_rpc_user;
pub(crate) mod example_config;
pub(crate) mod export_mnemonic;
pub(crate) mod generate_mnemonic;
pub(crate) mod import_mnemonic;
pub(crate) mod init_wallet_encryption;
pub(crate) mod new_account;
pub(crate) mod start;

#[cfg(feature = "rpc-cli")]
pub(crate) mod rpc_cli;

/// Subcommands whose body is async, run to completion on a fresh Tokio runtime.
///
/// Abscissa's [`Runnable`] is synchronous, so every subcommand that needs `.await`
/// implements this instead and exposes itself to the CLI dispatcher via
/// `self.run_on_runtime()` from its [`Runnable::run`].
pub(crate) trait AsyncRunnable {
    async fn run(&self) -> Result<(), Error>;

    fn run_on_runtime(&self) {
        match abscissa_tokio::run(&APP, self.run()) {
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

impl Runnable for EntryPoint {
    fn run(&self) {
        self.cmd.run()
    }
}

impl Configurable<UmbraConfig> for EntryPoint {
    fn config_path(&self) -> Option<PathBuf> {
        // Check if the config file exists, and if it does not, ignore it.
        // If you'd like for a missing configuration file to be a hard error
        // instead, always return `Some(CONFIG_FILE)` here.
        let filename = self
            .config
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| CONFIG_FILE.into());

        if filename.exists() {
            Some(filename)
        } else {
            None
        }
    }

    fn process_config(&self, config: UmbraConfig) -> Result<UmbraConfig, FrameworkError> {
        match &self.cmd {
            UmbraCmd::Start(cmd) => cmd.override_config(config),
            _ => Ok(config),
        }
    }
}

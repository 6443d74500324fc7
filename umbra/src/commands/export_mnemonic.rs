use abscissa_core::Runnable;
use secrecy::ExposeSecret;

use crate::{
    cli::ExportMnemonicCmd,
    commands::AsyncRunnable,
    components::{database::Database, keystore::KeyStore},
    error::Error,
    prelude::*,
};

impl AsyncRunnable for ExportMnemonicCmd {
    async fn run(&self) -> Result<(), Error> {
        let config = APP.config();
        let _lock = config.lock_datadir()?;

        let db = Database::open(&config).await?;
        let keystore = KeyStore::new(&config, db).await?;

        let phrase = keystore.export_mnemonic().await?;
        println!("{}", phrase.expose_secret());

        Ok(())
    }
}

impl Runnable for ExportMnemonicCmd {
    fn run(&self) {
        self.run_on_runtime();
    }
}

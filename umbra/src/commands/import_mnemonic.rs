use abscissa_core::Runnable;
use secrecy::SecretString;

use crate::{
    cli::ImportMnemonicCmd,
    commands::AsyncRunnable,
    components::{database::Database, keystore::KeyStore},
    error::{Error, ErrorKind},
    prelude::*,
};

impl AsyncRunnable for ImportMnemonicCmd {
    async fn run(&self) -> Result<(), Error> {
        let config = APP.config();
        let _lock = config.lock_datadir()?;

        let db = Database::open(&config).await?;
        let keystore = KeyStore::new(&config, db).await?;

        let phrase = SecretString::new(
            rpassword::prompt_password("Enter the mnemonic phrase to import: ")
                .map_err(|e| ErrorKind::Generic.context(e))?,
        );

        keystore.generate_or_import(Some(phrase)).await?;

        println!("Mnemonic imported.");

        Ok(())
    }
}

impl Runnable for ImportMnemonicCmd {
    fn run(&self) {
        self.run_on_runtime();
    }
}

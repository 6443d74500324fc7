use abscissa_core::Runnable;

use crate::{
    cli::InitWalletEncryptionCmd,
    commands::AsyncRunnable,
    components::{database::Database, keystore::KeyStore},
    error::{Error, ErrorKind},
    prelude::*,
};

impl AsyncRunnable for InitWalletEncryptionCmd {
    async fn run(&self) -> Result<(), Error> {
        let config = APP.config();
        let _lock = config.lock_datadir()?;

        let db = Database::open(&config).await?;
        let keystore = KeyStore::new(&config, db).await?;

        // Derive the recipients this wallet encrypts key material to from the
        // configured identity file. Passphrase-encrypted identity files are not yet
        // supported here (their recipients can only be recovered after unlocking).
        let identity_file = age::IdentityFile::from_file(
            config
                .encryption_identity()
                .to_str()
                .ok_or_else(|| {
                    ErrorKind::Init.context(format!(
                        "{} is not currently supported (not UTF-8)",
                        config.encryption_identity().display(),
                    ))
                })?
                .to_string(),
        )
        .map_err(|e| ErrorKind::Generic.context(e))?;

        let mut recipients = vec![];
        identity_file
            .write_recipients_file(&mut recipients)
            .map_err(|e| ErrorKind::Generic.context(e))?;
        let recipient_strings = String::from_utf8(recipients)
            .map_err(|e| ErrorKind::Generic.context(e))?
            .lines()
            .map(String::from)
            .collect();

        keystore.initialize_recipients(recipient_strings).await?;

        println!("Wallet encryption initialized.");

        Ok(())
    }
}

impl Runnable for InitWalletEncryptionCmd {
    fn run(&self) {
        self.run_on_runtime();
    }
}

//! `new-account` subcommand

use abscissa_core::Runnable;

use crate::{
    address::Codec,
    cli::NewAccountCmd,
    commands::AsyncRunnable,
    components::{database::Database, keystore::KeyStore},
    error::Error,
    prelude::*,
};

impl AsyncRunnable for NewAccountCmd {
    async fn run(&self) -> Result<(), Error> {
        let config = APP.config();
        let _lock = config.lock_datadir()?;

        let db = Database::open(&config).await?;
        let keystore = KeyStore::new(&config, db).await?;

        let address = keystore.get_sub_address(self.account, 0).await?;

        println!("{}", address.encode(config.network));

        Ok(())
    }
}

impl Runnable for NewAccountCmd {
    fn run(&self) {
        self.run_on_runtime();
    }
}

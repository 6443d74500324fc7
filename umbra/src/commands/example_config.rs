//! `example-config` subcommand

use abscissa_core::Runnable;
use tokio::{fs::File, io::AsyncWriteExt};

use crate::{
    cli::ExampleConfigCmd,
    commands::AsyncRunnable,
    config::UmbraConfig,
    error::{Error, ErrorKind},
};

impl AsyncRunnable for ExampleConfigCmd {
    async fn run(&self) -> Result<(), Error> {
        let output = UmbraConfig::generate_example();

        match self.output.as_deref() {
            None | Some("-") => println!("{output}"),
            Some(path) => {
                let mut f = if self.force {
                    File::create(path).await
                } else {
                    File::create_new(path).await
                }
                .map_err(|e| ErrorKind::Generic.context(e))?;
                f.write_all(output.as_bytes())
                    .await
                    .map_err(|e| ErrorKind::Generic.context(e))?;
                println!("Wrote example configuration to {path}");
            }
        }

        Ok(())
    }
}

impl Runnable for ExampleConfigCmd {
    fn run(&self) {
        self.run_on_runtime();
    }
}

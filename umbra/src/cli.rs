use abscissa_core::{Command, Runnable};
use clap::{Parser, builder::Styles};

#[derive(Debug, Parser, Command)]
#[command(author, about, version)]
#[command(help_template = format!("\
{{before-help}}{{about-with-newline}}
{}Usage:{} {{usage}}

{{all-args}}{{after-help}}\
    ",
    Styles::default().get_usage().render(),
    Styles::default().get_usage().render_reset()))]
pub struct EntryPoint {
    #[command(subcommand)]
    pub(crate) cmd: UmbraCmd,

    /// Enable verbose logging
    #[arg(short, long)]
    pub(crate) verbose: bool,

    /// Use the specified config file
    #[arg(short, long)]
    pub(crate) config: Option<String>,
}

#[derive(Debug, Parser, Command, Runnable)]
pub(crate) enum UmbraCmd {
    /// Add a username and password to the JSON-RPC server's auth list
    AddRpcUser(AddRpcUserCmd),

    /// Print an example configuration file
    ExampleConfig(ExampleConfigCmd),

    /// Export the wallet seed as a mnemonic phrase
    ExportMnemonic(ExportMnemonicCmd),

    /// Generate a new wallet seed and print it as a mnemonic phrase
    GenerateMnemonic(GenerateMnemonicCmd),

    /// Import a wallet seed from a mnemonic phrase
    ImportMnemonic(ImportMnemonicCmd),

    /// Initialize the age identity used to encrypt key material at rest
    InitWalletEncryption(InitWalletEncryptionCmd),

    /// Create a new account and print its first sub-address
    NewAccount(NewAccountCmd),

    /// Call a method on a running Umbra's JSON-RPC server
    #[cfg(feature = "rpc-cli")]
    Rpc(RpcCliCmd),

    /// Start the wallet sync engine and JSON-RPC server
    Start(StartCmd),
}

/// `add-rpc-user` subcommand
#[derive(Debug, Parser, Command)]
pub(crate) struct AddRpcUserCmd {
    /// The username to grant JSON-RPC access to.
    pub(crate) username: String,
}

/// `example-config` subcommand
#[derive(Debug, Parser, Command)]
pub(crate) struct ExampleConfigCmd {
    /// Where to write the example configuration. Prints to stdout if omitted or `-`.
    #[arg(short, long)]
    pub(crate) output: Option<String>,

    /// Overwrite `output` if it already exists.
    #[arg(short, long)]
    pub(crate) force: bool,
}

/// `export-mnemonic` subcommand
#[derive(Debug, Parser, Command)]
pub(crate) struct ExportMnemonicCmd {}

/// `generate-mnemonic` subcommand
#[derive(Debug, Parser, Command)]
pub(crate) struct GenerateMnemonicCmd {}

/// `import-mnemonic` subcommand
#[derive(Debug, Parser, Command)]
pub(crate) struct ImportMnemonicCmd {}

/// `init-wallet-encryption` subcommand
#[derive(Debug, Parser, Command)]
pub(crate) struct InitWalletEncryptionCmd {}

/// `new-account` subcommand
#[derive(Debug, Parser, Command)]
pub(crate) struct NewAccountCmd {
    /// The account number to create the first sub-address under.
    pub(crate) account: i64,
}

/// `rpc` subcommand
#[derive(Debug, Parser, Command)]
pub(crate) struct RpcCliCmd {
    /// The JSON-RPC method to call.
    pub(crate) command: String,

    /// JSON-encoded positional parameters for the method.
    pub(crate) params: Vec<String>,
}

/// `start` subcommand
#[derive(Debug, Parser, Command)]
pub(crate) struct StartCmd {}

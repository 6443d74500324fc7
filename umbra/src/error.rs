use std::fmt;
use std::ops::Deref;

use abscissa_core::error::{BoxError, Context};

/// The kinds of error that can occur while running Umbra.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    /// The on-disk configuration is missing or malformed.
    Configuration,
    /// Failed to establish a connection to a fetch provider.
    Connect,
    /// A previously-connected fetch provider dropped its connection.
    Disconnected,
    /// A request to a fetch provider did not complete within the configured timeout.
    Timeout,
    /// Data received from a fetch provider violated an expected protocol invariant.
    ProtocolInvariantViolation,
    /// A block, transaction or output could not be parsed.
    Parse,
    /// A reorganization was detected and `sync.stop_on_reorg` is set.
    ReorgDetected,
    /// An output believed to belong to the wallet could not have its amount recovered.
    AmountRecoveryFailed,
    /// A transaction could not be constructed or broadcast.
    TxBuildFailed,
    /// The selected inputs do not cover the requested amount plus fee.
    InsufficientFunds,
    /// No wallet database exists at the configured path.
    WalletNotFound,
    /// The wallet is locked and the requested operation needs spending keys.
    WalletLocked,
    /// A supplied mnemonic phrase failed checksum validation.
    InvalidMnemonic,
    /// A supplied address string could not be decoded.
    InvalidAddress,
    /// The on-disk wallet database returned an unexpected error.
    Storage,
    /// An error occurred during process startup.
    Init,
    /// A miscellaneous error with no more specific classification.
    Generic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ErrorKind::Configuration => "invalid configuration",
            ErrorKind::Connect => "failed to connect to fetch provider",
            ErrorKind::Disconnected => "fetch provider connection lost",
            ErrorKind::Timeout => "request timed out",
            ErrorKind::ProtocolInvariantViolation => "fetch provider violated protocol invariant",
            ErrorKind::Parse => "failed to parse chain data",
            ErrorKind::ReorgDetected => "chain reorganization detected",
            ErrorKind::AmountRecoveryFailed => "failed to recover output amount",
            ErrorKind::TxBuildFailed => "failed to build transaction",
            ErrorKind::InsufficientFunds => "insufficient spendable funds",
            ErrorKind::WalletNotFound => "wallet database not found",
            ErrorKind::WalletLocked => "wallet is locked",
            ErrorKind::InvalidMnemonic => "invalid mnemonic phrase",
            ErrorKind::InvalidAddress => "invalid address",
            ErrorKind::Storage => "wallet storage error",
            ErrorKind::Init => "initialization error",
            ErrorKind::Generic => "error",
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for ErrorKind {}

impl ErrorKind {
    /// Creates an error context from this error.
    pub(crate) fn context(self, source: impl Into<BoxError>) -> Context<ErrorKind> {
        Context::new(self, Some(source.into()))
    }
}

/// Error type
#[derive(Debug)]
pub(crate) struct Error(Box<Context<ErrorKind>>);

impl Deref for Error {
    type Target = Context<ErrorKind>;

    fn deref(&self) -> &Context<ErrorKind> {
        &self.0
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Context::new(kind, None).into()
    }
}

impl From<Context<ErrorKind>> for Error {
    fn from(context: Context<ErrorKind>) -> Self {
        Error(Box::new(context))
    }
}

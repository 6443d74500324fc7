use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum KeystoreError {
    MissingRecipients,
}

impl fmt::Display for KeystoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRecipients => write!(
                f,
                "no encryption recipients configured for this wallet.\n\
                 Run `umbra init-wallet-encryption` before generating or importing a seed."
            ),
        }
    }
}

impl std::error::Error for KeystoreError {}

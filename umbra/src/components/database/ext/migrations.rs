use schemerz_rusqlite::RusqliteMigration;

mod initial_setup;

/// Error type returned by Umbra's `schemerz` migrations.
#[derive(Debug)]
pub(crate) struct MigrationError(pub(crate) rusqlite::Error);

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MigrationError {}

impl From<rusqlite::Error> for MigrationError {
    fn from(e: rusqlite::Error) -> Self {
        Self(e)
    }
}

pub(in crate::components) fn all(
    network_type: crate::network::Network,
) -> impl Iterator<Item = Box<dyn RusqliteMigration<Error = MigrationError>>> {
    [Box::new(initial_setup::Migration { network_type }) as _].into_iter()
}

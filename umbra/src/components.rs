//! Components of Umbra.
//!
//! These are not [`abscissa_core::Component`]s because Abscissa's dependency injection is
//! [buggy](https://github.com/iqlusioninc/abscissa/issues/989).

pub(crate) mod database;
pub(crate) mod json_rpc;
pub(crate) mod keystore;
pub(crate) mod provider;
pub(crate) mod sync;
pub(crate) mod wallet;

/// A handle to a long-running background task spawned via [`crate::spawn`].
pub(crate) type TaskHandle = tokio::task::JoinHandle<()>;

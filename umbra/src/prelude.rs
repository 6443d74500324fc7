//! Application-local prelude.
//!
//! Brings the application type, global application instance, and trace macros into
//! scope for the rest of the crate, mirroring `abscissa`-generated applications.

pub use abscissa_core::Application;

/// The application global instance.
pub use crate::application::APP;

pub use tracing::{debug, error, info, trace, warn};

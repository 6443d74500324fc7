//! Umbra
//!
//! A light-client wallet for BLS12-381 confidential-transaction chains, built on the
//! [Abscissa] application framework.
//!
//! [Abscissa]: https://github.com/iqlusioninc/abscissa

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unused_lifetimes,
    unused_qualifications
)]

mod address;
pub mod application;
mod cli;
mod commands;
mod components;
pub mod config;
mod crypto;
mod error;
mod mempool;
pub mod network;
mod parser;
mod prelude;
mod storage;
mod task;

// Needed for the `Command`/`Runnable` derives to work.
use abscissa_core::{Application, Version, component};

// Loads the build-time information.
shadow_rs::shadow!(build);

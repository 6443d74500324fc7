//! Main entry point for Umbra

#![deny(warnings, missing_docs, trivial_casts, unused_qualifications)]
#![forbid(unsafe_code)]

/// Boot Umbra
fn main() {
    umbra::application::boot();
}

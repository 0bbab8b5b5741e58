//! Subcommand implementations for the `parcel-enrich` binary.

pub mod doctor;
pub mod extract;
pub mod profile;
pub mod run;
pub mod status;

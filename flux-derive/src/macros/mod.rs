//! Macro implementations

pub mod flux_record;

pub use flux_record::derive_flux_record;

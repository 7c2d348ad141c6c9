//! Core types shared across the crate.
//!
//! Currently this module hosts the error taxonomy. Every subsystem returns
//! [`UpdraftError`] through the [`Result`] alias; `anyhow` appears only at
//! binary entry points.

pub mod error;

pub use error::{Result, UpdraftError};

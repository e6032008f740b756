//! # attic-core
//!
//! Core types, error taxonomy and configuration for Attic.
//!
//! This crate provides the foundational building blocks used across all other crates:
//! - The error taxonomy (`ErrorKind`) every crate error classifies into
//! - Identifier aliases
//! - Configuration types and environment loading

pub mod config;
pub mod error;
pub mod types;

pub use error::*;
pub use types::*;

//! # Importer Common Library
//!
//! Shared code for the content importer crates:
//! - Error and result types
//! - Configuration loading and root folder resolution
//! - SQLite database initialization and schema

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};

//! Test Helper Utilities
//!
//! Shared utilities for importer integration tests

#![allow(dead_code)]

pub mod db_utils;
pub mod faulty_store;

pub use db_utils::{create_file_db, create_memory_pool, sqlite_test_engine};
pub use faulty_store::FaultyStore;

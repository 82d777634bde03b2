//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading
//! - Database: Relational conversation stores
//! - Storage: File-backed document stores and backend selection

pub mod config;
pub mod database;
pub mod storage;

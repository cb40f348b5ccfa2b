//! # JobTrack Common Library
//!
//! Shared code for the JobTrack services:
//! - Database initialization, schema and entity models
//! - Event types and the EventBus used for change notifications
//! - API authentication helpers
//! - Configuration loading
//! - Account credentials and role/administrator bootstrap

pub mod accounts;
pub mod api;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};

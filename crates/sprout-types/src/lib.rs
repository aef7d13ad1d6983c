//! Shared domain types for Sprout.
//!
//! This crate contains the core domain types used across the Sprout backend:
//! conversation messages and records, boundary end reasons, service
//! configuration, and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod conversation;
pub mod error;

//! # Storage
//!
//! Durable key-value state backed by redb.

pub mod registry;

pub use registry::VersionRegistry;

//! Core types and shared functionality for precache.
//!
//! This crate provides:
//! - The request/response model shared by the store, network and router
//! - Cache storage behind the `CacheStore` trait, with SQLite and in-memory backends
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod request;
pub mod response;

pub use cache::{CacheDb, CacheHandle, CacheStore, EntryKey, MemoryStore, enforce_bound};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use request::{Destination, Request};
pub use response::Response;

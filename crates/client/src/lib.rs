//! Network access for precache.
//!
//! This crate provides the `Network` abstraction the worker fetches through,
//! its reqwest-backed implementation, and URL handling for asset lists.

pub mod fetch;

pub use fetch::{FetchClient, FetchConfig, Network, UrlError, canonicalize, resolve_asset};

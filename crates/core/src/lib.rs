//! Sea Fennel Core - Shared types library.
//!
//! This crate provides common types used across all Sea Fennel components:
//! - `cart` - Cart synchronization and option-validation engine
//! - `storefront` - Public-facing surface binary
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients. This keeps
//! it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

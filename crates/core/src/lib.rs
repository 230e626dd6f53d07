//! Grocer Core - Shared types library.
//!
//! This crate provides common types used across all grocer components:
//! - `cart` - Cart store and remote Cart API client
//! - `cli` - Command-line tool for driving the cart against a backend
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients. This keeps
//! it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, and quantities

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

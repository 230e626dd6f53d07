//! Grocer Cart - client-side cart synchronized with the remote Cart API.
//!
//! # Architecture
//!
//! - [`CartStore`] owns the local cart and publishes it through a `watch`
//!   channel. It is injected with an [`AuthProvider`] (token + user id) and
//!   a [`CartApi`] implementation.
//! - [`HttpCartApi`] is the `reqwest` implementation of [`CartApi`]. Routes
//!   for update/remove/clear are probed from configured candidate lists.
//! - [`conversions`] maps the backend's inconsistent line payloads into
//!   [`CartItem`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use grocer_cart::{AuthSession, CartApiConfig, CartStore, HttpCartApi};
//!
//! let config = CartApiConfig::from_env()?;
//! let resync_delay = config.resync_delay;
//! let auth = Arc::new(AuthSession::logged_in(token, user_json));
//! let store = CartStore::new(HttpCartApi::new(config)?, auth, resync_delay);
//!
//! store.load().await?;
//! store.add(ProductId::from(5)).await?;
//! store.update_quantity(&ProductId::from(5), -1).await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod auth;
pub mod config;
pub mod conversions;
pub mod error;
pub mod store;
pub mod types;

pub use api::{CartApi, EndpointCandidate, EndpointCandidates, HttpCartApi, Operation};
pub use auth::{AuthProvider, AuthSession};
pub use config::{CartApiConfig, ConfigError};
pub use error::CartError;
pub use store::CartStore;
pub use types::{CartItem, CartState, Product};

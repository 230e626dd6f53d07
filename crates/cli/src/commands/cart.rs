//! Cart commands.
//!
//! # Usage
//!
//! ```bash
//! grocer cart list
//! grocer cart add 5
//! grocer cart update 5 -1
//! grocer cart remove 5
//! grocer cart clear
//! ```
//!
//! # Environment Variables
//!
//! - `GROCER_API_TOKEN` - Bearer token for the cart API
//! - `GROCER_USER_ID` - Id of the user the token belongs to (optional)
//! - `CART_API_*` - See `grocer_cart::config`

use std::sync::Arc;

use grocer_cart::{AuthProvider, AuthSession, CartApiConfig, CartState, CartStore, HttpCartApi};
use grocer_core::ProductId;
use secrecy::SecretString;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur before the cart store is usable.
#[derive(Debug, Error)]
pub enum CartCommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Cart API configuration is invalid.
    #[error(transparent)]
    Config(#[from] grocer_cart::ConfigError),

    /// Cart operation failed.
    #[error(transparent)]
    Cart(#[from] grocer_cart::CartError),
}

type Store = CartStore<HttpCartApi>;

/// Build a store from the environment and load the current cart.
async fn connect() -> Result<Store, CartCommandError> {
    let token = std::env::var("GROCER_API_TOKEN")
        .map(SecretString::from)
        .map_err(|_| CartCommandError::MissingEnvVar("GROCER_API_TOKEN"))?;
    let user = std::env::var("GROCER_USER_ID")
        .map_or_else(|_| json!({}), |id| json!({ "id": id }));

    let config = CartApiConfig::from_env()?;
    let resync_delay = config.resync_delay;
    info!(base_url = %config.base_url, "Connecting to cart API");

    let auth: Arc<dyn AuthProvider> = Arc::new(AuthSession::logged_in(token, user));
    let store = CartStore::new(HttpCartApi::new(config)?, auth, resync_delay);
    store.load().await?;
    Ok(store)
}

/// Log every line and the totals.
fn report(state: &CartState) {
    if state.is_empty() {
        info!("Cart is empty");
        return;
    }

    for item in &state.items {
        info!(
            product_id = %item.product_id,
            cart_item_id = ?item.cart_item_id.as_ref().map(ToString::to_string),
            quantity = %item.quantity,
            price = %item.price,
            "{}",
            item.name
        );
    }
    match state.subtotal() {
        Some(subtotal) => info!(
            items = state.item_count(),
            subtotal = %subtotal.round_dp(2),
            "Cart totals"
        ),
        None => warn!(
            items = state.item_count(),
            "Cart subtotal is too large to compute"
        ),
    }
}

/// Show the current cart.
///
/// # Errors
///
/// Returns an error if configuration is missing or the cart cannot be loaded.
pub async fn list() -> Result<(), CartCommandError> {
    let store = connect().await?;
    report(&store.snapshot());
    Ok(())
}

/// Add one unit of a product.
///
/// # Errors
///
/// Returns an error if configuration is missing or the API rejects the request.
pub async fn add(product_id: &str) -> Result<(), CartCommandError> {
    let store = connect().await?;
    store.add(ProductId::new(product_id)).await?;
    report(&store.snapshot());
    Ok(())
}

/// Change a line's quantity by `delta`.
///
/// # Errors
///
/// Returns an error if configuration is missing, the product is not in the
/// cart, or every update route fails.
pub async fn update(product_id: &str, delta: i64) -> Result<(), CartCommandError> {
    let store = connect().await?;
    store
        .update_quantity(&ProductId::new(product_id), delta)
        .await?;
    report(&store.snapshot());
    Ok(())
}

/// Remove a line.
///
/// # Errors
///
/// Returns an error if configuration is missing, the product is not in the
/// cart, or every remove route fails.
pub async fn remove(product_id: &str) -> Result<(), CartCommandError> {
    let store = connect().await?;
    store.remove(&ProductId::new(product_id)).await?;
    report(&store.snapshot());
    Ok(())
}

/// Empty the cart.
///
/// # Errors
///
/// Returns an error if configuration is missing or the cart cannot be loaded.
pub async fn clear() -> Result<(), CartCommandError> {
    let store = connect().await?;
    let lines = store.items().len();
    store.clear().await?;

    // clear() never reports remote failures; reload to show what the server kept.
    if let Err(e) = store.load().await {
        warn!(error = %e, "Could not confirm cart after clearing");
    }
    info!(lines, "Cleared cart");
    report(&store.snapshot());
    Ok(())
}

//! Cart errors.

use grocer_core::{ProductId, QuantityError};
use thiserror::Error;

use crate::api::Operation;

/// Errors that can occur when synchronizing the cart with the remote API.
#[derive(Debug, Error)]
pub enum CartError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Token rejected by the API.
    #[error("Unauthorized: token rejected by cart API")]
    Unauthorized,

    /// Rate limited by the API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Response body could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Every configured endpoint candidate for an operation failed.
    #[error("All {operation} endpoints failed: {last_error}")]
    EndpointsExhausted {
        operation: Operation,
        last_error: Box<CartError>,
    },

    /// No configured candidate could be used for the operation (for example,
    /// every path needs a cart item id and none is known).
    #[error("No usable {0} endpoint configured")]
    NoUsableEndpoint(Operation),

    /// The product is not in the local cart.
    #[error("Item not found in cart: {0}")]
    ItemNotFound(ProductId),

    /// The product is in the local cart but has never been confirmed by the
    /// server, so it has no server-side row to address.
    #[error("Cart item for product {0} has no server id yet")]
    MissingCartItemId(ProductId),

    /// The requested quantity change cannot be represented.
    #[error("Invalid quantity for product {product_id}: {source}")]
    InvalidQuantity {
        product_id: ProductId,
        source: QuantityError,
    },
}

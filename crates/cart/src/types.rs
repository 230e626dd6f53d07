//! Cart domain types.
//!
//! These are the normalized, client-side shapes. Raw server payloads are
//! mapped into them by [`crate::conversions`].

use grocer_core::{CartItemId, Price, ProductId, Quantity, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Placeholder name for items the server returned without one.
pub const UNKNOWN_PRODUCT_NAME: &str = "Unknown Product";

/// A single cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Catalog product; unique within a cart.
    pub product_id: ProductId,
    /// Server-side row id; `None` until the server has confirmed the line.
    pub cart_item_id: Option<CartItemId>,
    /// Display name.
    pub name: String,
    /// Unit price.
    pub price: Price,
    /// Number of units, always at least 1.
    pub quantity: Quantity,
    /// Image URL.
    pub image: Option<String>,
    /// Product description.
    pub description: Option<String>,
}

impl CartItem {
    /// Price times quantity. `None` if it does not fit in a `Decimal`.
    #[must_use]
    pub fn line_total(&self) -> Option<Decimal> {
        self.price.line_total(self.quantity)
    }
}

/// A product as offered to [`crate::CartStore::add`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Catalog product id.
    pub id: ProductId,
    /// Display name, used only for logging.
    pub name: Option<String>,
}

impl Product {
    /// A product known only by id.
    #[must_use]
    pub const fn new(id: ProductId) -> Self {
        Self { id, name: None }
    }
}

impl From<ProductId> for Product {
    fn from(id: ProductId) -> Self {
        Self::new(id)
    }
}

/// Observable cart state.
///
/// Published on every change, including optimistic ones, through
/// [`crate::CartStore::subscribe`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartState {
    /// Cart lines, unique by product id.
    pub items: Vec<CartItem>,
    /// A load request is in flight.
    pub is_loading: bool,
    /// Message from the last failed operation; cleared by the next success.
    pub error: Option<String>,
    /// User the cart was last loaded for.
    pub last_user_id: Option<UserId>,
    /// Bumped on every change to `items`.
    #[serde(skip)]
    pub(crate) revision: u64,
}

impl CartState {
    /// Monotonic counter of local cart mutations.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Line for a product.
    #[must_use]
    pub fn get(&self, product_id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.product_id == product_id)
    }

    /// Whether a product is in the cart.
    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.get(product_id).is_some()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.items
            .iter()
            .map(|item| u64::from(item.quantity.get()))
            .sum()
    }

    /// Sum of all line totals. `None` if any line or the sum overflows.
    #[must_use]
    pub fn subtotal(&self) -> Option<Decimal> {
        self.items
            .iter()
            .try_fold(Decimal::ZERO, |total, item| {
                item.line_total()?.checked_add(total)
            })
    }

    /// Replace the lines and bump the revision.
    pub(crate) fn set_items(&mut self, items: Vec<CartItem>) {
        self.items = items;
        self.revision += 1;
    }
}

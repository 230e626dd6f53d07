//! Raw cart payload conversion functions.
//!
//! The cart backend is not consistent about field names: depending on the
//! endpoint and deployment a line may carry `productId` or a populated
//! `product` object, `name` or `productName`, numbers or numeric strings.
//! Everything here is tolerant; a line is only dropped when no product id
//! can be found at all.

use grocer_core::{CartItemId, Price, ProductId, Quantity};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::warn;

use crate::types::{CartItem, UNKNOWN_PRODUCT_NAME};

// =============================================================================
// List Response
// =============================================================================

/// Pull the array of raw lines out of a list response body.
///
/// Accepts a bare array, or an object carrying it under `items`,
/// `cartItems`, `cart.items`, `data`, or `data.items`. Anything else is
/// treated as an empty cart.
#[must_use]
pub fn extract_raw_items(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            for key in ["items", "cartItems"] {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return items;
                }
            }
            for key in ["cart", "data"] {
                if let Some(nested) = map.remove(key) {
                    return extract_raw_items(nested);
                }
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}

// =============================================================================
// Line Normalization
// =============================================================================

/// Normalize one raw line. Returns `None` when it has no product id.
#[must_use]
pub fn normalize_item(raw: &Value) -> Option<CartItem> {
    let product = raw.get("product");
    let nested = |key: &str| product.and_then(|p| p.get(key));

    let product_id = first_present(&[
        raw.get("productId"),
        raw.get("product_id"),
        nested("_id"),
        nested("id"),
        product.filter(|p| !p.is_object()),
    ])
    .and_then(ProductId::from_json);

    let Some(product_id) = product_id else {
        warn!(raw = %raw, "Dropping cart line without a product id");
        return None;
    };

    let cart_item_id = [raw.get("cartItemId"), raw.get("_id"), raw.get("id")]
        .into_iter()
        .flatten()
        .find_map(CartItemId::from_json);

    let name = [
        raw.get("name"),
        raw.get("productName"),
        raw.get("title"),
        nested("name"),
    ]
    .into_iter()
    .flatten()
    .find_map(non_empty_string)
    .unwrap_or_else(|| UNKNOWN_PRODUCT_NAME.to_string());

    let price = [raw.get("price"), raw.get("productPrice"), nested("price")]
        .into_iter()
        .flatten()
        .find_map(decimal_from_json)
        .map_or(Price::ZERO, |amount| {
            if amount.is_sign_negative() && !amount.is_zero() {
                warn!(product_id = %product_id, %amount, "Clamping negative price to zero");
            }
            Price::clamped(amount)
        });

    let quantity = [raw.get("quantity"), raw.get("qty")]
        .into_iter()
        .flatten()
        .find_map(integer_from_json)
        .map_or(Quantity::ONE, |value| {
            Quantity::new(value).unwrap_or_else(|_| {
                warn!(product_id = %product_id, value, "Clamping out-of-range quantity to 1");
                Quantity::ONE
            })
        });

    let image = [raw.get("image"), raw.get("imageUrl"), nested("image")]
        .into_iter()
        .flatten()
        .find_map(non_empty_string);

    let description = [raw.get("description"), nested("description")]
        .into_iter()
        .flatten()
        .find_map(non_empty_string);

    Some(CartItem {
        product_id,
        cart_item_id,
        name,
        price,
        quantity,
        image,
        description,
    })
}

/// Normalize a list of raw lines and collapse duplicates by product id.
///
/// When the server returns the same product twice, the line with the larger
/// quantity wins; it takes the position of the first occurrence.
#[must_use]
pub fn normalize_items(raw: &[Value]) -> Vec<CartItem> {
    let mut items: Vec<CartItem> = Vec::with_capacity(raw.len());

    for item in raw.iter().filter_map(normalize_item) {
        match items
            .iter_mut()
            .find(|existing| existing.product_id == item.product_id)
        {
            Some(existing) => {
                if item.quantity > existing.quantity {
                    *existing = item;
                }
            }
            None => items.push(item),
        }
    }

    items
}

// =============================================================================
// Scalar Helpers
// =============================================================================

fn first_present<'a>(candidates: &[Option<&'a Value>]) -> Option<&'a Value> {
    candidates
        .iter()
        .flatten()
        .copied()
        .find(|value| !value.is_null())
}

fn non_empty_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse::<Decimal>().ok().or_else(|| {
            n.as_f64().and_then(|f| Decimal::try_from(f).ok())
        }),
        Value::String(s) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)] // only whole floats are cast
fn integer_from_json(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

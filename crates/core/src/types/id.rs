//! Newtype IDs for type-safe entity references.
//!
//! The cart backend hands out identifiers as either JSON strings (document
//! ids) or JSON integers (row ids), sometimes both for the same entity
//! depending on the endpoint. IDs are therefore stored as strings and
//! deserialize from either representation.

/// Macro to define a type-safe, string-backed ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize` as a plain string, `Deserialize` from a string or an integer
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<&str>`, `From<String>`, `From<i64>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use grocer_core::define_id;
/// define_id!(WarehouseId);
/// define_id!(RouteId);
///
/// let warehouse = WarehouseId::from(7);
/// let route = RouteId::new("r-7");
/// assert_eq!(warehouse.as_str(), "7");
///
/// // These are different types, so this won't compile:
/// // let _: WarehouseId = route;
/// # let _ = route;
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from anything string-like.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID, returning the underlying string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Build an ID from a JSON scalar (string or number).
            ///
            /// Returns `None` for other JSON values and for empty strings.
            #[must_use]
            pub fn from_json(value: &::serde_json::Value) -> Option<Self> {
                match value {
                    ::serde_json::Value::String(s) if !s.trim().is_empty() => {
                        Some(Self(s.trim().to_string()))
                    }
                    ::serde_json::Value::Number(n) => Some(Self(n.to_string())),
                    _ => None,
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id.to_string())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> ::core::result::Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                let value = <::serde_json::Value as ::serde::Deserialize>::deserialize(
                    deserializer,
                )?;
                Self::from_json(&value).ok_or_else(|| {
                    <D::Error as ::serde::de::Error>::custom(concat!(
                        "expected a non-empty string or number for ",
                        stringify!($name)
                    ))
                })
            }
        }
    };
}

// Define standard entity IDs
define_id!(UserId);
define_id!(ProductId);
define_id!(CartItemId);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_from_number_and_string_compare_equal() {
        let from_number: ProductId = serde_json::from_value(json!(5)).expect("number id");
        let from_string: ProductId = serde_json::from_value(json!("5")).expect("string id");
        assert_eq!(from_number, from_string);
        assert_eq!(from_number.to_string(), "5");
    }

    #[test]
    fn test_id_rejects_empty_and_non_scalar() {
        assert!(serde_json::from_value::<UserId>(json!("  ")).is_err());
        assert!(serde_json::from_value::<UserId>(json!(null)).is_err());
        assert!(serde_json::from_value::<UserId>(json!({"id": 1})).is_err());
    }

    #[test]
    fn test_id_serializes_as_plain_string() {
        let id = CartItemId::new("64f0c1");
        assert_eq!(serde_json::to_value(&id).expect("serialize"), json!("64f0c1"));
    }
}

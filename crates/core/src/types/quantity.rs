//! Cart line quantity.

use core::fmt;
use core::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityError {
    /// The value is zero or negative.
    #[error("quantity must be at least 1, got {0}")]
    BelowOne(i64),
    /// The value does not fit in a `u32`.
    #[error("quantity {0} is too large")]
    TooLarge(i64),
}

/// A cart line quantity, always at least 1.
///
/// A line whose quantity would drop below 1 is not a line any more, so the
/// type cannot represent it. [`Quantity::offset`] returns `Ok(None)` in that
/// case and the caller removes the line instead.
///
/// ```
/// use grocer_core::Quantity;
///
/// let two = Quantity::new(2).unwrap();
/// assert_eq!(two.offset(-1).unwrap().map(Quantity::get), Some(1));
/// assert_eq!(two.offset(-2), Ok(None));
/// assert!(two.offset(i64::from(u32::MAX)).is_err());
/// assert!(Quantity::new(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(NonZeroU32);

impl Quantity {
    /// A quantity of one.
    pub const ONE: Self = Self(NonZeroU32::MIN);

    /// Create a quantity from a signed value.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is below 1 or above `u32::MAX`.
    pub fn new(value: i64) -> Result<Self, QuantityError> {
        if value < 1 {
            return Err(QuantityError::BelowOne(value));
        }
        u32::try_from(value)
            .ok()
            .and_then(NonZeroU32::new)
            .map(Self)
            .ok_or(QuantityError::TooLarge(value))
    }

    /// The quantity as a plain integer.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// Apply a signed delta. `Ok(None)` means the result would be below 1.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::TooLarge`] if the result does not fit in a
    /// `u32`.
    pub fn offset(self, delta: i64) -> Result<Option<Self>, QuantityError> {
        // A u32 plus any i64 only overflows upwards
        let value = i64::from(self.get())
            .checked_add(delta)
            .ok_or(QuantityError::TooLarge(delta))?;
        match Self::new(value) {
            Ok(quantity) => Ok(Some(quantity)),
            Err(QuantityError::BelowOne(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.get()
    }
}

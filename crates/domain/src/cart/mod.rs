//! Cart aggregate and the service that persists it.

mod aggregate;
mod service;

pub use aggregate::{Cart, CartItem};
pub use service::CartService;

use common::ProductId;
use thiserror::Error;

use crate::Money;

/// Errors raised by cart mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Quantities must be strictly positive.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i64 },

    /// Unit prices must not be negative and must fit the stored precision.
    #[error(
        "Invalid price: {} (must be non-negative, with at most 4 decimal places and 15 integer digits)",
        price.amount()
    )]
    InvalidPrice { price: Money },

    /// The cart holds no item for this product.
    #[error("Item not found: {product_id}")]
    ItemNotFound { product_id: ProductId },
}

//! Domain error types.

use common::{CartId, OrderId};
use store::StoreError;
use thiserror::Error;

use crate::{CartError, OrderError};

/// Errors that can occur during domain operations.
///
/// Everything except [`DomainError::Store`] describes a request that cannot
/// succeed as stated. `Store` is a transactional failure the caller may
/// retry.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A cart mutation was rejected.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// An order operation was rejected.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Checkout was attempted on a cart without items.
    #[error("Cart {0} is empty")]
    EmptyCart(CartId),

    #[error("Cart not found: {0}")]
    CartNotFound(CartId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The cart changed underneath this operation.
    #[error("Concurrency conflict on cart {cart_id}")]
    ConcurrencyConflict { cart_id: CartId },

    /// The order's status changed underneath this operation.
    #[error("Concurrency conflict on order {order_id}")]
    OrderConflict { order_id: OrderId },

    /// A stored record violates an aggregate invariant.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// The store failed; nothing from this operation was committed.
    #[error("Transaction failed: {0}")]
    Store(StoreError),
}

impl DomainError {
    /// Returns true if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DomainError::Store(_)
                | DomainError::ConcurrencyConflict { .. }
                | DomainError::OrderConflict { .. }
        )
    }

    /// Short label used for metrics.
    pub(crate) fn reason(&self) -> &'static str {
        match self {
            DomainError::Cart(_) => "invalid_cart",
            DomainError::Order(_) => "invalid_order",
            DomainError::EmptyCart(_) => "empty_cart",
            DomainError::CartNotFound(_) => "cart_not_found",
            DomainError::OrderNotFound(_) => "order_not_found",
            DomainError::ConcurrencyConflict { .. } => "concurrency_conflict",
            DomainError::OrderConflict { .. } => "order_conflict",
            DomainError::CorruptRecord(_) => "corrupt_record",
            DomainError::Store(_) => "store",
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConcurrencyConflict { cart_id, .. } => {
                DomainError::ConcurrencyConflict { cart_id }
            }
            StoreError::StatusConflict { order_id, .. } => DomainError::OrderConflict { order_id },
            other => DomainError::Store(other),
        }
    }
}

//! Order aggregate and related types.

mod aggregate;
mod service;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use service::OrderService;
pub use state::OrderStatus;
pub use value_objects::OrderItem;

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// The order cannot move to the requested status.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },
}

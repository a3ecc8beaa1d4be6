//! Value objects for the order domain.

use common::{OrderItemId, ProductId};
use serde::{Deserialize, Serialize};

use crate::{CartItem, Money};

/// A frozen line of an order.
///
/// Captures product, quantity and unit price as they stood on the cart at
/// checkout. Never mutated afterwards, so later price changes cannot alter
/// a past order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Assigned by the store on insert; `None` until then.
    id: Option<OrderItemId>,
    product_id: ProductId,
    quantity: i32,
    unit_price: Money,
}

impl OrderItem {
    /// Snapshots a cart line.
    pub fn snapshot(item: &CartItem) -> Self {
        Self {
            id: None,
            product_id: item.product_id(),
            quantity: item.quantity(),
            unit_price: item.unit_price(),
        }
    }

    pub(crate) fn stored(
        id: OrderItemId,
        product_id: ProductId,
        quantity: i32,
        unit_price: Money,
    ) -> Self {
        Self {
            id: Some(id),
            product_id,
            quantity,
            unit_price,
        }
    }

    pub fn id(&self) -> Option<OrderItemId> {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> i32 {
        self.quantity
    }

    /// Unit price captured at checkout.
    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    /// Returns the total price for this item (quantity * unit_price).
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AccountId, OrderId};
use store::{NewOrder, NewOrderItem, OrderRecord};

use super::{OrderError, OrderItem, OrderStatus};
use crate::{Cart, DomainError, Money};

/// Order aggregate root.
///
/// Created once from a cart at checkout and never edited afterwards, apart
/// from its status. Always holds at least one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    owner_id: AccountId,
    created_at: DateTime<Utc>,
    status: OrderStatus,
    items: Vec<OrderItem>,
}

impl Order {
    /// Places a new order.
    ///
    /// Fails with [`OrderError::NoItems`] if `items` is empty.
    pub fn place(
        owner_id: AccountId,
        created_at: DateTime<Utc>,
        items: Vec<OrderItem>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }

        Ok(Self {
            id: OrderId::new(),
            owner_id,
            created_at,
            status: OrderStatus::Placed,
            items,
        })
    }

    /// Places an order for the cart's owner holding a snapshot of every
    /// cart line.
    pub fn from_cart(cart: &Cart, created_at: DateTime<Utc>) -> Result<Self, OrderError> {
        let items = cart.items().map(OrderItem::snapshot).collect();
        Self::place(cart.owner_id(), created_at, items)
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn owner_id(&self) -> AccountId {
        self.owner_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Sum of quantity × unit price over all items.
    pub fn total(&self) -> Money {
        self.items.iter().map(OrderItem::total_price).sum()
    }

    /// Moves the order to a new status.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidStatusTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Converts the order into the form the store inserts.
    pub fn to_new_order(&self) -> NewOrder {
        NewOrder {
            id: self.id,
            owner_id: self.owner_id,
            created_at: self.created_at,
            status: self.status.as_str().to_string(),
            items: self
                .items
                .iter()
                .map(|item| NewOrderItem {
                    product_id: item.product_id(),
                    quantity: item.quantity(),
                    unit_price: item.unit_price().amount(),
                })
                .collect(),
        }
    }

    /// Rebuilds an order from its stored form.
    pub fn from_record(record: OrderRecord) -> Result<Self, DomainError> {
        let status = OrderStatus::parse(&record.status).ok_or_else(|| {
            DomainError::CorruptRecord(format!(
                "order {} has unknown status {:?}",
                record.id, record.status
            ))
        })?;

        if record.items.is_empty() {
            return Err(DomainError::CorruptRecord(format!(
                "order {} has no items",
                record.id
            )));
        }

        let items = record
            .items
            .into_iter()
            .map(|row| {
                OrderItem::stored(row.id, row.product_id, row.quantity, Money::new(row.unit_price))
            })
            .collect();

        Ok(Self {
            id: record.id,
            owner_id: record.owner_id,
            created_at: record.created_at,
            status,
            items,
        })
    }
}

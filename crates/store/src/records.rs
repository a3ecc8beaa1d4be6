//! Row-level records exchanged with the store.
//!
//! Child rows (cart items, order items) are owned by their parent record and
//! only travel together with it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{AccountId, CartId, CartItemId, OrderId, OrderItemId, ProductId, Version};

/// A persisted cart with its items.
#[derive(Debug, Clone, PartialEq)]
pub struct CartRecord {
    pub id: CartId,
    pub owner_id: AccountId,
    /// Version the cart was loaded at. Ignored on save; the caller passes the
    /// expected version explicitly.
    pub version: Version,
    pub items: Vec<CartItemRecord>,
}

/// One line of a persisted cart.
#[derive(Debug, Clone, PartialEq)]
pub struct CartItemRecord {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// An order about to be inserted.
///
/// Items carry no identity yet; the store assigns one on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub id: OrderId,
    pub owner_id: AccountId,
    pub created_at: DateTime<Utc>,
    pub status: String,
    pub items: Vec<NewOrderItem>,
}

/// An order line about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// A persisted order with its items.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub id: OrderId,
    pub owner_id: AccountId,
    pub created_at: DateTime<Utc>,
    pub status: String,
    pub items: Vec<OrderItemRecord>,
}

/// One line of a persisted order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItemRecord {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl OrderRecord {
    /// Builds the stored form of `order`, assigning item identities.
    pub(crate) fn assign_identities(order: NewOrder) -> Self {
        Self {
            id: order.id,
            owner_id: order.owner_id,
            created_at: order.created_at,
            status: order.status,
            items: order
                .items
                .into_iter()
                .map(|item| OrderItemRecord {
                    id: OrderItemId::new(),
                    product_id: item.product_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
        }
    }
}

/// A customer account together with its credential material.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRecord {
    pub id: AccountId,
    pub email: String,
    pub credential: CredentialRecord,
    pub created_at: DateTime<Utc>,
}

/// Stored password hash and the parameters that produced it.
///
/// Never contains the plaintext password. Numeric parameters are kept in
/// their column types; callers validate them before use.
#[derive(Clone, PartialEq)]
pub struct CredentialRecord {
    pub digest: Vec<u8>,
    pub salt: Vec<u8>,
    pub algorithm: String,
    pub memory_kib: i32,
    pub iterations: i32,
    pub parallelism: i32,
    pub output_len: i32,
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("digest", &"[redacted]")
            .field("salt", &"[redacted]")
            .field("algorithm", &self.algorithm)
            .field("memory_kib", &self.memory_kib)
            .field("iterations", &self.iterations)
            .field("parallelism", &self.parallelism)
            .field("output_len", &self.output_len)
            .finish()
    }
}

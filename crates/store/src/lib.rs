//! Persistence collaborator for the online store core.
//!
//! Carts and orders are written through a [`UnitOfWork`] opened from a
//! [`Store`]; everything written inside one unit of work becomes visible
//! together on commit or not at all. Carts carry a [`Version`] that is checked
//! on every save, so two writers racing on the same cart cannot both win.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;
pub mod version;

pub use common::{AccountId, CartId, CartItemId, OrderId, OrderItemId, ProductId};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use records::{
    AccountRecord, CartItemRecord, CartRecord, CredentialRecord, NewOrder, NewOrderItem,
    OrderItemRecord, OrderRecord,
};
pub use store::{AccountStore, Store, UnitOfWork};
pub use version::Version;

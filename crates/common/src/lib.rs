//! Shared building blocks for the online store core.
//!
//! Holds the strongly typed identifiers used across crates and the
//! [`Clock`] abstraction every time-dependent operation reads from.

pub mod clock;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use types::{AccountId, CartId, CartItemId, OrderId, OrderItemId, ProductId};

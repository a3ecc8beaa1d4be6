//! Domain layer for the online store.
//!
//! This crate provides:
//! - [`Money`], a fixed-point amount
//! - the [`Cart`] aggregate and the [`CartService`] that persists it
//! - the [`Order`] aggregate with its [`OrderStatus`] lifecycle
//! - [`CheckoutService`], which turns a cart into an order atomically

pub mod cart;
pub mod checkout;
pub mod error;
pub mod money;
pub mod order;
mod transaction;

pub use cart::{Cart, CartError, CartItem, CartService};
pub use checkout::CheckoutService;
pub use error::DomainError;
pub use money::Money;
pub use order::{Order, OrderError, OrderItem, OrderService, OrderStatus};

//! Checkout: turning a cart into an order.

use std::sync::Arc;

use common::{CartId, Clock};
use store::{Store, UnitOfWork};

use crate::{Cart, DomainError, Order, transaction};

/// Converts carts into price-locked orders.
///
/// Each checkout runs in its own unit of work. The order is inserted and the
/// cart cleared against the version it was read at, so of two checkouts
/// racing on the same cart exactly one commits; the other fails with
/// [`DomainError::ConcurrencyConflict`] and leaves no trace.
pub struct CheckoutService<S: Store> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: Store> CheckoutService<S> {
    /// Creates a checkout service that timestamps orders with `clock`.
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Places an order holding every item of the cart and empties the cart.
    ///
    /// Either both happen or neither does. Dropping the returned future
    /// before it completes rolls the unit of work back.
    #[tracing::instrument(skip(self))]
    pub async fn checkout(&self, cart_id: CartId) -> Result<Order, DomainError> {
        let started = std::time::Instant::now();

        let result = match self.store.begin().await {
            Ok(mut uow) => {
                let placed = Self::place_order(uow.as_mut(), self.clock.as_ref(), cart_id).await;
                transaction::finish(uow, placed).await
            }
            Err(e) => Err(e.into()),
        };

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("checkout_completed_total").increment(1);
                tracing::info!(
                    order_id = %order.id(),
                    items = order.items().len(),
                    total = %order.total(),
                    "checkout completed"
                );
            }
            Err(e) => {
                metrics::counter!("checkout_failed_total", "reason" => e.reason()).increment(1);
                if e.is_transient() {
                    tracing::warn!(error = %e, "checkout rolled back");
                } else {
                    tracing::info!(error = %e, "checkout rejected");
                }
            }
        }

        result
    }

    async fn place_order(
        uow: &mut dyn UnitOfWork,
        clock: &dyn Clock,
        cart_id: CartId,
    ) -> Result<Order, DomainError> {
        let record = uow
            .load_cart(cart_id)
            .await?
            .ok_or(DomainError::CartNotFound(cart_id))?;
        let mut cart = Cart::from_record(record)?;

        if cart.is_empty() {
            return Err(DomainError::EmptyCart(cart_id));
        }

        // Prices come from the cart lines, never from the live catalog.
        let order = Order::from_cart(&cart, clock.now())?;
        uow.insert_order(order.to_new_order()).await?;

        let expected = cart.version();
        cart.clear();
        uow.save_cart(cart.to_record(), expected).await?;

        // Item identities are assigned by the store on insert.
        let stored = uow
            .load_order(order.id())
            .await?
            .ok_or(DomainError::OrderNotFound(order.id()))?;
        Order::from_record(stored)
    }
}

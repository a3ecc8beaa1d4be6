//! Order service providing a simplified API for order operations.

use common::{AccountId, OrderId};
use store::{Store, UnitOfWork};

use super::{Order, OrderStatus};
use crate::{DomainError, transaction};

/// Service for reading placed orders and moving them through their status
/// lifecycle.
///
/// Orders are created only by checkout.
pub struct OrderService<S: Store> {
    store: S,
}

impl<S: Store> OrderService<S> {
    /// Creates a new order service with the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an order.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, DomainError> {
        let mut uow = self.store.begin().await?;
        let result = Self::load(uow.as_mut(), order_id).await;
        transaction::discard(uow).await;
        result
    }

    /// Loads every order of an account, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn orders_for_owner(&self, owner_id: AccountId) -> Result<Vec<Order>, DomainError> {
        let mut uow = self.store.begin().await?;
        let result = match uow.orders_for_owner(owner_id).await {
            Ok(records) => records.into_iter().map(Order::from_record).collect(),
            Err(e) => Err(e.into()),
        };
        transaction::discard(uow).await;
        result
    }

    /// Moves an order to a new status.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, DomainError> {
        let mut uow = self.store.begin().await?;
        let result = Self::transition(uow.as_mut(), order_id, status).await;
        let order = transaction::finish(uow, result).await?;

        tracing::info!(%order_id, status = %order.status(), "order status changed");
        Ok(order)
    }

    async fn load(uow: &mut dyn UnitOfWork, order_id: OrderId) -> Result<Order, DomainError> {
        let record = uow
            .load_order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;
        Order::from_record(record)
    }

    async fn transition(
        uow: &mut dyn UnitOfWork,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, DomainError> {
        let mut order = Self::load(uow, order_id).await?;
        let from = order.status();
        order.transition_to(status)?;
        uow.update_order_status(order_id, from.as_str(), status.as_str())
            .await?;
        Ok(order)
    }
}

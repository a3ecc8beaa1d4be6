use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AccountId, AccountRecord, CartId, CartRecord, CredentialRecord, NewOrder, OrderId,
    OrderRecord, Result, StoreError, Version,
    store::{AccountStore, Store, UnitOfWork},
};

#[derive(Debug, Default)]
struct State {
    carts: HashMap<CartId, CartRecord>,
    orders: HashMap<OrderId, OrderRecord>,
    accounts: HashMap<AccountId, AccountRecord>,
}

/// In-memory store implementation for testing.
///
/// Provides the same transactional guarantees as the PostgreSQL
/// implementation: writes are buffered per unit of work and validated and
/// applied under a single write lock on commit.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of committed carts.
    pub async fn cart_count(&self) -> usize {
        self.state.read().await.carts.len()
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Removes all carts, orders and accounts.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.carts.clear();
        state.orders.clear();
        state.accounts.clear();
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        Ok(Box::new(InMemoryUnitOfWork {
            state: Arc::clone(&self.state),
            carts: HashMap::new(),
            orders: Vec::new(),
            status_updates: Vec::new(),
        }))
    }
}

/// A cart write waiting for commit.
#[derive(Debug)]
struct PendingCart {
    record: CartRecord,
    /// Version the committed cart must still be at.
    base: Version,
    /// Version the cart gets once committed.
    version: Version,
}

/// Unit of work over an [`InMemoryStore`].
pub struct InMemoryUnitOfWork {
    state: Arc<RwLock<State>>,
    carts: HashMap<CartId, PendingCart>,
    orders: Vec<OrderRecord>,
    status_updates: Vec<StatusUpdate>,
}

/// An order status change waiting for commit.
#[derive(Debug)]
struct StatusUpdate {
    order_id: OrderId,
    from: String,
    to: String,
}

impl InMemoryUnitOfWork {
    fn pending_cart(pending: &PendingCart) -> CartRecord {
        CartRecord {
            version: pending.version,
            ..pending.record.clone()
        }
    }

    fn apply_status_updates(&self, mut order: OrderRecord) -> OrderRecord {
        for update in &self.status_updates {
            if update.order_id == order.id {
                order.status = update.to.clone();
            }
        }
        order
    }

    /// Checks every buffered write against the committed state.
    fn validate(&self, state: &State) -> Result<()> {
        for (cart_id, pending) in &self.carts {
            let committed = state.carts.get(cart_id);
            let actual = committed.map(|c| c.version).unwrap_or_default();

            if actual != pending.base {
                return Err(StoreError::ConcurrencyConflict {
                    cart_id: *cart_id,
                    expected: pending.base,
                    actual,
                });
            }

            // One cart per owner.
            if committed.is_none()
                && state
                    .carts
                    .values()
                    .any(|c| c.owner_id == pending.record.owner_id)
            {
                return Err(StoreError::ConcurrencyConflict {
                    cart_id: *cart_id,
                    expected: pending.base,
                    actual: Version::first(),
                });
            }
        }

        for order in &self.orders {
            if state.orders.contains_key(&order.id) {
                return Err(StoreError::Conflict(format!(
                    "order {} already exists",
                    order.id
                )));
            }
        }

        // Replays the buffered changes on top of the committed statuses.
        let mut statuses: HashMap<OrderId, &str> = HashMap::new();
        for update in &self.status_updates {
            let order_id = update.order_id;
            let current = match statuses.get(&order_id) {
                Some(status) => *status,
                None => state
                    .orders
                    .get(&order_id)
                    .map(|o| o.status.as_str())
                    .ok_or_else(|| StoreError::NotFound(format!("order {order_id}")))?,
            };
            if current != update.from {
                return Err(StoreError::StatusConflict {
                    order_id,
                    expected: update.from.clone(),
                    actual: current.to_string(),
                });
            }
            statuses.insert(order_id, update.to.as_str());
        }

        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn load_cart(&mut self, cart_id: CartId) -> Result<Option<CartRecord>> {
        if let Some(pending) = self.carts.get(&cart_id) {
            return Ok(Some(Self::pending_cart(pending)));
        }

        let state = self.state.read().await;
        Ok(state.carts.get(&cart_id).cloned())
    }

    async fn load_cart_by_owner(&mut self, owner_id: AccountId) -> Result<Option<CartRecord>> {
        if let Some(pending) = self
            .carts
            .values()
            .find(|p| p.record.owner_id == owner_id)
        {
            return Ok(Some(Self::pending_cart(pending)));
        }

        let state = self.state.read().await;
        Ok(state
            .carts
            .values()
            .find(|c| c.owner_id == owner_id)
            .cloned())
    }

    async fn save_cart(&mut self, cart: CartRecord, expected: Version) -> Result<Version> {
        let cart_id = cart.id;
        let version = expected.next();

        match self.carts.get_mut(&cart_id) {
            Some(pending) => {
                if pending.version != expected {
                    return Err(StoreError::ConcurrencyConflict {
                        cart_id,
                        expected,
                        actual: pending.version,
                    });
                }
                pending.record = cart;
                pending.version = version;
            }
            None => {
                self.carts.insert(
                    cart_id,
                    PendingCart {
                        record: cart,
                        base: expected,
                        version,
                    },
                );
            }
        }

        Ok(version)
    }

    async fn load_order(&mut self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        if let Some(order) = self.orders.iter().find(|o| o.id == order_id) {
            return Ok(Some(order.clone()));
        }

        let committed = self.state.read().await.orders.get(&order_id).cloned();
        Ok(committed.map(|order| self.apply_status_updates(order)))
    }

    async fn orders_for_owner(&mut self, owner_id: AccountId) -> Result<Vec<OrderRecord>> {
        let committed: Vec<OrderRecord> = {
            let state = self.state.read().await;
            state
                .orders
                .values()
                .filter(|o| o.owner_id == owner_id)
                .cloned()
                .collect()
        };

        let mut orders: Vec<_> = committed
            .into_iter()
            .map(|order| self.apply_status_updates(order))
            .chain(
                self.orders
                    .iter()
                    .filter(|o| o.owner_id == owner_id)
                    .cloned(),
            )
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<()> {
        if self.orders.iter().any(|o| o.id == order.id) {
            return Err(StoreError::Conflict(format!(
                "order {} already exists",
                order.id
            )));
        }

        self.orders.push(OrderRecord::assign_identities(order));
        Ok(())
    }

    async fn update_order_status(
        &mut self,
        order_id: OrderId,
        from: &str,
        to: &str,
    ) -> Result<()> {
        let conflict = |actual: &str| StoreError::StatusConflict {
            order_id,
            expected: from.to_string(),
            actual: actual.to_string(),
        };

        if let Some(order) = self.orders.iter_mut().find(|o| o.id == order_id) {
            if order.status != from {
                return Err(conflict(&order.status));
            }
            order.status = to.to_string();
            return Ok(());
        }

        let committed = self.state.read().await.orders.get(&order_id).cloned();
        let Some(order) = committed else {
            return Err(StoreError::NotFound(format!("order {order_id}")));
        };
        let current = self.apply_status_updates(order).status;
        if current != from {
            return Err(conflict(&current));
        }

        self.status_updates.push(StatusUpdate {
            order_id,
            from: from.to_string(),
            to: to.to_string(),
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        let mut state = this.state.write().await;

        this.validate(&state)?;

        for (cart_id, pending) in this.carts {
            state.carts.insert(
                cart_id,
                CartRecord {
                    version: pending.version,
                    ..pending.record
                },
            );
        }

        for order in this.orders {
            state.orders.insert(order.id, order);
        }

        for update in this.status_updates {
            if let Some(order) = state.orders.get_mut(&update.order_id) {
                order.status = update.to;
            }
        }

        tracing::debug!("in-memory unit of work committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        tracing::debug!(
            discarded_carts = self.carts.len(),
            discarded_orders = self.orders.len(),
            "in-memory unit of work rolled back"
        );
        Ok(())
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn create_account(&self, account: AccountRecord) -> Result<()> {
        let mut state = self.state.write().await;

        if state.accounts.values().any(|a| a.email == account.email) {
            return Err(StoreError::Conflict(format!(
                "email {} already registered",
                account.email
            )));
        }
        if state.accounts.contains_key(&account.id) {
            return Err(StoreError::Conflict(format!(
                "account {} already exists",
                account.id
            )));
        }

        state.accounts.insert(account.id, account);
        Ok(())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<AccountRecord>> {
        let state = self.state.read().await;
        Ok(state.accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_account(&self, account_id: AccountId) -> Result<Option<AccountRecord>> {
        let state = self.state.read().await;
        Ok(state.accounts.get(&account_id).cloned())
    }

    async fn update_credential(
        &self,
        account_id: AccountId,
        credential: CredentialRecord,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| StoreError::NotFound(format!("account {account_id}")))?;
        account.credential = credential;
        Ok(())
    }
}

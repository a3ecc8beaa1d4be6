use async_trait::async_trait;

use crate::{
    AccountId, AccountRecord, CartId, CartRecord, CredentialRecord, NewOrder, OrderId,
    OrderRecord, Result, Version,
};

/// Entry point for transactional access to carts and orders.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a new unit of work.
    ///
    /// The unit of work belongs to a single business operation and must be
    /// committed or rolled back by it. Dropping it without committing
    /// discards every write made through it.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

/// A transactional scope over the cart and order tables.
///
/// Writes made through a unit of work are invisible to everyone else until
/// [`commit`](UnitOfWork::commit) succeeds. Reads see the unit of work's own
/// pending cart writes.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Loads a cart and its items.
    async fn load_cart(&mut self, cart_id: CartId) -> Result<Option<CartRecord>>;

    /// Loads the cart belonging to an account.
    async fn load_cart_by_owner(&mut self, owner_id: AccountId) -> Result<Option<CartRecord>>;

    /// Saves a cart and replaces its items.
    ///
    /// `expected` is the version the cart was loaded at, or
    /// [`Version::initial`] for a cart that was never saved. If the stored
    /// version differs when the write is applied, the operation fails with
    /// `ConcurrencyConflict`. Returns the version the cart will have once
    /// committed.
    async fn save_cart(&mut self, cart: CartRecord, expected: Version) -> Result<Version>;

    /// Loads an order and its items.
    async fn load_order(&mut self, order_id: OrderId) -> Result<Option<OrderRecord>>;

    /// Loads every order placed by an account, oldest first.
    async fn orders_for_owner(&mut self, owner_id: AccountId) -> Result<Vec<OrderRecord>>;

    /// Inserts a new order. Item identities are assigned here.
    async fn insert_order(&mut self, order: NewOrder) -> Result<()>;

    /// Moves an order from status `from` to status `to`.
    ///
    /// Fails with `StatusConflict` if the order is no longer in `from` when
    /// the write is applied, and with `NotFound` if it does not exist.
    async fn update_order_status(&mut self, order_id: OrderId, from: &str, to: &str)
    -> Result<()>;

    /// Makes every write of this unit of work durable, atomically.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discards every write of this unit of work.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Storage for accounts and their credential material.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Creates an account.
    ///
    /// Fails with `Conflict` if the email is already registered.
    async fn create_account(&self, account: AccountRecord) -> Result<()>;

    /// Finds an account by its (normalised) email address.
    async fn find_account_by_email(&self, email: &str) -> Result<Option<AccountRecord>>;

    /// Finds an account by id.
    async fn find_account(&self, account_id: AccountId) -> Result<Option<AccountRecord>>;

    /// Replaces the stored credential of an account.
    async fn update_credential(
        &self,
        account_id: AccountId,
        credential: CredentialRecord,
    ) -> Result<()>;
}

//! Cart service providing a simplified API for cart operations.

use common::{AccountId, ProductId};
use store::{Store, UnitOfWork, Version};

use super::{Cart, CartError};
use crate::{DomainError, Money, transaction};

/// Service for managing the cart of each account.
///
/// Every operation runs in its own unit of work: the cart is loaded, changed
/// in memory and saved against the version it was loaded at. A concurrent
/// write to the same cart makes the later one fail with
/// [`DomainError::ConcurrencyConflict`].
pub struct CartService<S: Store> {
    store: S,
}

impl<S: Store> CartService<S> {
    /// Creates a new cart service backed by the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads the cart of an account, if it has one.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, owner_id: AccountId) -> Result<Option<Cart>, DomainError> {
        let mut uow = self.store.begin().await?;
        let result = match uow.load_cart_by_owner(owner_id).await {
            Ok(record) => record.map(Cart::from_record).transpose(),
            Err(e) => Err(e.into()),
        };
        transaction::discard(uow).await;
        result
    }

    /// Adds units of a product, creating the cart on first use.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        owner_id: AccountId,
        product_id: ProductId,
        quantity: i32,
        unit_price: Money,
    ) -> Result<Cart, DomainError> {
        self.execute(owner_id, |cart| {
            cart.add_item(product_id, quantity, unit_price)
        })
        .await
    }

    /// Removes a product from the cart.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        owner_id: AccountId,
        product_id: ProductId,
    ) -> Result<Cart, DomainError> {
        self.execute(owner_id, |cart| cart.remove_item(product_id).map(|_| ()))
            .await
    }

    /// Sets the quantity of a product already in the cart.
    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        owner_id: AccountId,
        product_id: ProductId,
        new_quantity: i32,
    ) -> Result<Cart, DomainError> {
        self.execute(owner_id, |cart| {
            cart.update_quantity(product_id, new_quantity)
        })
        .await
    }

    /// Takes units of a product out of the cart.
    #[tracing::instrument(skip(self))]
    pub async fn remove_quantity(
        &self,
        owner_id: AccountId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<Cart, DomainError> {
        self.execute(owner_id, |cart| cart.remove_quantity(product_id, quantity))
            .await
    }

    /// Empties the cart.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, owner_id: AccountId) -> Result<Cart, DomainError> {
        self.execute(owner_id, |cart| {
            cart.clear();
            Ok(())
        })
        .await
    }

    /// Loads the owner's cart (or starts a new one), applies `command_fn`
    /// and saves the result in one unit of work.
    async fn execute<F>(&self, owner_id: AccountId, command_fn: F) -> Result<Cart, DomainError>
    where
        F: FnOnce(&mut Cart) -> Result<(), CartError> + Send,
    {
        let mut uow = self.store.begin().await?;
        let result = Self::apply(uow.as_mut(), owner_id, command_fn).await;
        transaction::finish(uow, result).await
    }

    async fn apply<F>(
        uow: &mut dyn UnitOfWork,
        owner_id: AccountId,
        command_fn: F,
    ) -> Result<Cart, DomainError>
    where
        F: FnOnce(&mut Cart) -> Result<(), CartError> + Send,
    {
        let mut cart = match uow.load_cart_by_owner(owner_id).await? {
            Some(record) => Cart::from_record(record)?,
            None => Cart::new(owner_id),
        };
        let expected = cart.version();

        command_fn(&mut cart)?;

        // Carts come into existence on their first item.
        if expected == Version::initial() && cart.is_empty() {
            return Ok(cart);
        }

        let new_version = uow.save_cart(cart.to_record(), expected).await?;
        cart.set_version(new_version);

        tracing::debug!(cart_id = %cart.id(), version = %new_version, "cart saved");
        Ok(cart)
    }
}

#[cfg(test)]
mod tests {
    use store::InMemoryStore;

    use super::*;

    fn service() -> CartService<InMemoryStore> {
        CartService::new(InMemoryStore::new())
    }

    #[tokio::test]
    async fn test_first_add_creates_cart() {
        let service = service();
        let owner = AccountId::new();
        assert!(service.get_cart(owner).await.unwrap().is_none());

        let cart = service
            .add_item(owner, ProductId::new(), 2, Money::from_cents(1000))
            .await
            .unwrap();

        assert_eq!(cart.version(), Version::first());
        assert_eq!(cart.owner_id(), owner);
        let stored = service.get_cart(owner).await.unwrap().unwrap();
        assert_eq!(stored, cart);
    }

    #[tokio::test]
    async fn test_each_change_bumps_version() {
        let service = service();
        let owner = AccountId::new();
        let product = ProductId::new();

        service
            .add_item(owner, product, 2, Money::from_cents(1000))
            .await
            .unwrap();
        service
            .add_item(owner, product, 3, Money::from_cents(1000))
            .await
            .unwrap();
        let cart = service.update_quantity(owner, product, 4).await.unwrap();

        assert_eq!(cart.version(), Version::new(3));
        assert_eq!(cart.item(product).unwrap().quantity(), 4);
        assert_eq!(service.store().cart_count().await, 1);
    }

    #[tokio::test]
    async fn test_rejected_change_is_not_saved() {
        let service = service();
        let owner = AccountId::new();
        let product = ProductId::new();
        service
            .add_item(owner, product, 2, Money::from_cents(1000))
            .await
            .unwrap();

        let result = service.update_quantity(owner, product, 0).await;
        assert!(matches!(
            result,
            Err(DomainError::Cart(CartError::InvalidQuantity { quantity: 0 }))
        ));

        let cart = service.get_cart(owner).await.unwrap().unwrap();
        assert_eq!(cart.version(), Version::first());
        assert_eq!(cart.item(product).unwrap().quantity(), 2);
    }

    #[tokio::test]
    async fn test_invalid_first_add_creates_nothing() {
        let service = service();
        let owner = AccountId::new();

        let result = service
            .add_item(owner, ProductId::new(), 1, Money::from_cents(-100))
            .await;
        assert!(matches!(
            result,
            Err(DomainError::Cart(CartError::InvalidPrice { .. }))
        ));
        assert_eq!(service.store().cart_count().await, 0);
    }

    #[tokio::test]
    async fn test_removing_last_unit_removes_item() {
        let service = service();
        let owner = AccountId::new();
        let product = ProductId::new();
        service
            .add_item(owner, product, 2, Money::from_cents(1000))
            .await
            .unwrap();

        let cart = service.remove_quantity(owner, product, 1).await.unwrap();
        assert_eq!(cart.item(product).unwrap().quantity(), 1);

        let cart = service.remove_quantity(owner, product, 1).await.unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_remove_item_from_missing_cart_fails() {
        let service = service();
        let product = ProductId::new();

        let result = service.remove_item(AccountId::new(), product).await;
        assert!(matches!(
            result,
            Err(DomainError::Cart(CartError::ItemNotFound { product_id })) if product_id == product
        ));
    }

    #[tokio::test]
    async fn test_clear_keeps_cart_but_empties_it() {
        let service = service();
        let owner = AccountId::new();
        service
            .add_item(owner, ProductId::new(), 2, Money::from_cents(1000))
            .await
            .unwrap();

        let cart = service.clear(owner).await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.version(), Version::new(2));
        assert_eq!(service.store().cart_count().await, 1);
    }

    #[tokio::test]
    async fn test_clear_without_cart_creates_nothing() {
        let service = service();
        let cart = service.clear(AccountId::new()).await.unwrap();
        assert!(cart.is_empty());
        assert_eq!(service.store().cart_count().await, 0);
    }
}

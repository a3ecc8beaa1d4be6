//! Cart aggregate implementation.

use std::collections::HashMap;

use common::{AccountId, CartId, CartItemId, ProductId};
use store::{CartItemRecord, CartRecord, Version};

use super::CartError;
use crate::{DomainError, Money};

/// One line of a cart.
///
/// Only reachable through its owning [`Cart`]; every mutation goes through
/// the cart's operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartItem {
    id: CartItemId,
    product_id: ProductId,
    quantity: i32,
    unit_price: Money,
}

impl CartItem {
    pub fn id(&self) -> CartItemId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> i32 {
        self.quantity
    }

    /// The most recently observed price for this product.
    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    /// Returns quantity × unit price.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Cart aggregate root.
///
/// Holds at most one [`CartItem`] per product. Every item quantity is
/// strictly positive; an item whose quantity would drop to zero is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cart {
    id: CartId,
    owner_id: AccountId,
    version: Version,
    items: HashMap<ProductId, CartItem>,
}

impl Cart {
    /// Creates an empty, never-saved cart for an account.
    pub fn new(owner_id: AccountId) -> Self {
        Self {
            id: CartId::new(),
            owner_id,
            version: Version::initial(),
            items: HashMap::new(),
        }
    }

    pub fn id(&self) -> CartId {
        self.id
    }

    pub fn owner_id(&self) -> AccountId {
        self.owner_id
    }

    /// Version the cart was loaded at ([`Version::initial`] if never saved).
    pub fn version(&self) -> Version {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of distinct products in the cart.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Sum of all item quantities.
    pub fn total_quantity(&self) -> i64 {
        self.items.values().map(|item| i64::from(item.quantity)).sum()
    }

    pub fn item(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.get(&product_id)
    }

    pub fn items(&self) -> impl Iterator<Item = &CartItem> {
        self.items.values()
    }

    /// Sum of quantity × unit price over all items.
    pub fn total(&self) -> Money {
        self.items
            .values()
            .map(CartItem::line_total)
            .sum()
    }

    /// Adds `quantity` units of a product at `unit_price`.
    ///
    /// If the product is already in the cart the quantities are merged and
    /// the stored price is replaced by `unit_price`.
    pub fn add_item(
        &mut self,
        product_id: ProductId,
        quantity: i32,
        unit_price: Money,
    ) -> Result<(), CartError> {
        validate_quantity(quantity)?;
        if unit_price.is_negative() || !unit_price.is_storable() {
            return Err(CartError::InvalidPrice { price: unit_price });
        }

        match self.items.get_mut(&product_id) {
            Some(item) => {
                item.quantity = item.quantity.checked_add(quantity).ok_or(
                    CartError::InvalidQuantity {
                        quantity: i64::from(item.quantity) + i64::from(quantity),
                    },
                )?;
                item.unit_price = unit_price;
            }
            None => {
                self.items.insert(
                    product_id,
                    CartItem {
                        id: CartItemId::new(),
                        product_id,
                        quantity,
                        unit_price,
                    },
                );
            }
        }

        Ok(())
    }

    /// Removes a product from the cart entirely.
    pub fn remove_item(&mut self, product_id: ProductId) -> Result<CartItem, CartError> {
        self.items
            .remove(&product_id)
            .ok_or(CartError::ItemNotFound { product_id })
    }

    /// Sets the quantity of a product already in the cart.
    pub fn update_quantity(
        &mut self,
        product_id: ProductId,
        new_quantity: i32,
    ) -> Result<(), CartError> {
        validate_quantity(new_quantity)?;

        let item = self
            .items
            .get_mut(&product_id)
            .ok_or(CartError::ItemNotFound { product_id })?;
        item.quantity = new_quantity;
        Ok(())
    }

    /// Takes `quantity` units of a product out of the cart.
    ///
    /// Removing as many units as the item holds, or more, removes the item.
    pub fn remove_quantity(
        &mut self,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<(), CartError> {
        validate_quantity(quantity)?;

        let item = self
            .items
            .get_mut(&product_id)
            .ok_or(CartError::ItemNotFound { product_id })?;

        if quantity >= item.quantity {
            self.items.remove(&product_id);
        } else {
            item.quantity -= quantity;
        }
        Ok(())
    }

    /// Removes every item.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Converts the cart into its stored form.
    pub fn to_record(&self) -> CartRecord {
        CartRecord {
            id: self.id,
            owner_id: self.owner_id,
            version: self.version,
            items: self
                .items
                .values()
                .map(|item| CartItemRecord {
                    id: item.id,
                    product_id: item.product_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price.amount(),
                })
                .collect(),
        }
    }

    /// Rebuilds a cart from its stored form.
    ///
    /// Rejects records that break the cart invariants.
    pub fn from_record(record: CartRecord) -> Result<Self, DomainError> {
        let mut items = HashMap::with_capacity(record.items.len());

        for row in record.items {
            let unit_price = Money::new(row.unit_price);
            if row.quantity <= 0 || unit_price.is_negative() {
                return Err(DomainError::CorruptRecord(format!(
                    "cart {} has an invalid line for product {}",
                    record.id, row.product_id
                )));
            }

            let item = CartItem {
                id: row.id,
                product_id: row.product_id,
                quantity: row.quantity,
                unit_price,
            };
            if items.insert(row.product_id, item).is_some() {
                return Err(DomainError::CorruptRecord(format!(
                    "cart {} holds product {} twice",
                    record.id, row.product_id
                )));
            }
        }

        Ok(Self {
            id: record.id,
            owner_id: record.owner_id,
            version: record.version,
            items,
        })
    }
}

fn validate_quantity(quantity: i32) -> Result<(), CartError> {
    if quantity <= 0 {
        return Err(CartError::InvalidQuantity {
            quantity: i64::from(quantity),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn cart() -> Cart {
        Cart::new(AccountId::new())
    }

    #[test]
    fn test_new_cart_is_empty_and_unsaved() {
        let cart = cart();
        assert!(cart.is_empty());
        assert_eq!(cart.version(), Version::initial());
        assert_eq!(cart.total(), Money::zero());
    }

    #[test]
    fn test_add_item_rejects_non_positive_quantity() {
        let mut cart = cart();
        for quantity in [0, -1, -5, i32::MIN] {
            let result = cart.add_item(ProductId::new(), quantity, Money::from_cents(100));
            assert_eq!(
                result,
                Err(CartError::InvalidQuantity {
                    quantity: i64::from(quantity)
                })
            );
        }
        assert!(cart.is_empty());
    }

    #[test]
    fn test_add_item_accepts_quantity_one() {
        let mut cart = cart();
        let product = ProductId::new();
        cart.add_item(product, 1, Money::from_cents(100)).unwrap();
        assert_eq!(cart.item(product).unwrap().quantity(), 1);
    }

    #[test]
    fn test_add_item_rejects_negative_price() {
        let mut cart = cart();
        let result = cart.add_item(ProductId::new(), 1, Money::from_cents(-1));
        assert_eq!(
            result,
            Err(CartError::InvalidPrice {
                price: Money::from_cents(-1)
            })
        );
    }

    #[test]
    fn test_add_item_rejects_prices_finer_than_stored_precision() {
        let mut cart = cart();
        let price = Money::new(Decimal::new(100005, 5));

        assert_eq!(
            cart.add_item(ProductId::new(), 1, price),
            Err(CartError::InvalidPrice { price })
        );
        assert!(cart.is_empty());

        // Trailing zeros do not count.
        cart.add_item(ProductId::new(), 1, Money::new(Decimal::new(100050, 5)))
            .unwrap();
        cart.add_item(ProductId::new(), 1, Money::new(Decimal::new(12345, 4)))
            .unwrap();
        assert_eq!(cart.item_count(), 2);
    }

    #[test]
    fn test_add_item_rejects_prices_too_large_to_store() {
        let mut cart = cart();
        let too_large = Money::new(Decimal::from(10_i64.pow(15)));

        assert_eq!(
            cart.add_item(ProductId::new(), 1, too_large),
            Err(CartError::InvalidPrice { price: too_large })
        );

        let largest = Money::new("999999999999999.9999".parse::<Decimal>().unwrap());
        cart.add_item(ProductId::new(), 1, largest).unwrap();
        assert_eq!(cart.item_count(), 1);
    }

    #[test]
    fn test_add_item_accepts_free_products() {
        let mut cart = cart();
        cart.add_item(ProductId::new(), 1, Money::zero()).unwrap();
        assert_eq!(cart.item_count(), 1);
    }

    #[test]
    fn test_adding_same_product_merges_quantities() {
        let mut cart = cart();
        let product = ProductId::new();
        cart.add_item(product, 2, Money::from_cents(1000)).unwrap();
        cart.add_item(product, 3, Money::from_cents(1000)).unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.item(product).unwrap().quantity(), 5);
    }

    #[test]
    fn test_adding_same_product_recaptures_price() {
        let mut cart = cart();
        let product = ProductId::new();
        cart.add_item(product, 1, Money::from_cents(1000)).unwrap();
        let id = cart.item(product).unwrap().id();
        cart.add_item(product, 1, Money::from_cents(1200)).unwrap();

        let item = cart.item(product).unwrap();
        assert_eq!(item.unit_price(), Money::from_cents(1200));
        assert_eq!(item.id(), id);
    }

    #[test]
    fn test_merge_overflow_is_rejected() {
        let mut cart = cart();
        let product = ProductId::new();
        cart.add_item(product, i32::MAX, Money::zero()).unwrap();
        let result = cart.add_item(product, 1, Money::zero());
        assert!(matches!(result, Err(CartError::InvalidQuantity { .. })));
        assert_eq!(cart.item(product).unwrap().quantity(), i32::MAX);
    }

    #[test]
    fn test_remove_item() {
        let mut cart = cart();
        let product = ProductId::new();
        cart.add_item(product, 2, Money::from_cents(100)).unwrap();

        let removed = cart.remove_item(product).unwrap();
        assert_eq!(removed.quantity(), 2);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove_absent_item_fails() {
        let mut cart = cart();
        let product = ProductId::new();
        assert_eq!(
            cart.remove_item(product),
            Err(CartError::ItemNotFound {
                product_id: product
            })
        );
    }

    #[test]
    fn test_update_quantity() {
        let mut cart = cart();
        let product = ProductId::new();
        cart.add_item(product, 2, Money::from_cents(100)).unwrap();

        cart.update_quantity(product, 7).unwrap();
        assert_eq!(cart.item(product).unwrap().quantity(), 7);

        for quantity in [0, -3] {
            assert!(matches!(
                cart.update_quantity(product, quantity),
                Err(CartError::InvalidQuantity { .. })
            ));
        }
        assert_eq!(cart.item(product).unwrap().quantity(), 7);
    }

    #[test]
    fn test_update_quantity_of_absent_item_fails() {
        let mut cart = cart();
        assert!(matches!(
            cart.update_quantity(ProductId::new(), 1),
            Err(CartError::ItemNotFound { .. })
        ));
    }

    #[test]
    fn test_remove_quantity_decrements_then_removes() {
        let mut cart = cart();
        let product = ProductId::new();
        cart.add_item(product, 3, Money::from_cents(100)).unwrap();

        cart.remove_quantity(product, 2).unwrap();
        assert_eq!(cart.item(product).unwrap().quantity(), 1);

        cart.remove_quantity(product, 1).unwrap();
        assert!(cart.item(product).is_none());
    }

    #[test]
    fn test_remove_more_than_held_removes_item() {
        let mut cart = cart();
        let product = ProductId::new();
        cart.add_item(product, 2, Money::from_cents(100)).unwrap();
        cart.remove_quantity(product, 10).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_totals() {
        let mut cart = cart();
        cart.add_item(ProductId::new(), 2, Money::from_cents(1000))
            .unwrap();
        cart.add_item(ProductId::new(), 1, Money::from_cents(500))
            .unwrap();

        assert_eq!(cart.total(), Money::from_cents(2500));
        assert_eq!(cart.total_quantity(), 3);
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut cart = cart();
        cart.add_item(ProductId::new(), 2, Money::from_cents(1000))
            .unwrap();
        cart.clear();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_record_round_trip_keeps_identity() {
        let mut cart = cart();
        let product = ProductId::new();
        cart.add_item(product, 2, Money::from_cents(1000)).unwrap();
        cart.set_version(Version::new(4));

        let restored = Cart::from_record(cart.to_record()).unwrap();
        assert_eq!(restored, cart);
    }

    #[test]
    fn test_from_record_rejects_invalid_lines() {
        let mut record = cart().to_record();
        record.items.push(CartItemRecord {
            id: CartItemId::new(),
            product_id: ProductId::new(),
            quantity: 0,
            unit_price: Money::from_cents(100).amount(),
        });
        assert!(matches!(
            Cart::from_record(record),
            Err(DomainError::CorruptRecord(_))
        ));
    }
}

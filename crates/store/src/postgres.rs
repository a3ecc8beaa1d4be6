use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AccountId, AccountRecord, CartId, CartItemId, CartItemRecord, CartRecord, CredentialRecord,
    NewOrder, OrderId, OrderItemId, OrderItemRecord, OrderRecord, ProductId, Result, StoreError,
    Version,
    store::{AccountStore, Store, UnitOfWork},
};

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }
}

/// Unit of work backed by a single database transaction.
///
/// Dropping it without committing rolls the transaction back.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

fn row_to_cart_item(row: &PgRow) -> Result<CartItemRecord> {
    Ok(CartItemRecord {
        id: CartItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
        product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
        quantity: row.try_get("quantity")?,
        unit_price: row.try_get("unit_price")?,
    })
}

fn row_to_order(row: &PgRow) -> Result<OrderRecord> {
    Ok(OrderRecord {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        owner_id: AccountId::from_uuid(row.try_get::<Uuid, _>("owner_id")?),
        created_at: row.try_get("created_at")?,
        status: row.try_get("status")?,
        items: Vec::new(),
    })
}

fn row_to_account(row: &PgRow) -> Result<AccountRecord> {
    Ok(AccountRecord {
        id: AccountId::from_uuid(row.try_get::<Uuid, _>("id")?),
        email: row.try_get("email")?,
        created_at: row.try_get("created_at")?,
        credential: CredentialRecord {
            digest: row.try_get("password_digest")?,
            salt: row.try_get("password_salt")?,
            algorithm: row.try_get("hash_algorithm")?,
            memory_kib: row.try_get("hash_memory_kib")?,
            iterations: row.try_get("hash_iterations")?,
            parallelism: row.try_get("hash_parallelism")?,
            output_len: row.try_get("hash_output_len")?,
        },
    })
}

impl PostgresUnitOfWork {
    async fn cart_from_row(&mut self, row: PgRow) -> Result<CartRecord> {
        let cart_id = CartId::from_uuid(row.try_get::<Uuid, _>("id")?);

        let item_rows = sqlx::query(
            r#"
            SELECT id, product_id, quantity, unit_price
            FROM cart_items
            WHERE cart_id = $1
            ORDER BY product_id
            "#,
        )
        .bind(cart_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(CartRecord {
            id: cart_id,
            owner_id: AccountId::from_uuid(row.try_get::<Uuid, _>("owner_id")?),
            version: Version::new(row.try_get("version")?),
            items: item_rows
                .iter()
                .map(row_to_cart_item)
                .collect::<Result<Vec<_>>>()?,
        })
    }

    /// Attaches item rows to their orders.
    async fn with_items(&mut self, mut orders: Vec<OrderRecord>) -> Result<Vec<OrderRecord>> {
        if orders.is_empty() {
            return Ok(orders);
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, quantity, unit_price
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY product_id
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut items: HashMap<Uuid, Vec<OrderItemRecord>> = HashMap::new();
        for row in rows {
            items
                .entry(row.try_get::<Uuid, _>("order_id")?)
                .or_default()
                .push(OrderItemRecord {
                    id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
                    product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
                    quantity: row.try_get("quantity")?,
                    unit_price: row.try_get("unit_price")?,
                });
        }

        for order in &mut orders {
            order.items = items.remove(&order.id.as_uuid()).unwrap_or_default();
        }
        Ok(orders)
    }

    async fn current_cart_version(&mut self, cart_id: CartId) -> Result<Version> {
        let version: Option<i64> = sqlx::query_scalar("SELECT version FROM carts WHERE id = $1")
            .bind(cart_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(version.map(Version::new).unwrap_or_default())
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn load_cart(&mut self, cart_id: CartId) -> Result<Option<CartRecord>> {
        let row = sqlx::query("SELECT id, owner_id, version FROM carts WHERE id = $1")
            .bind(cart_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => Ok(Some(self.cart_from_row(row).await?)),
            None => Ok(None),
        }
    }

    async fn load_cart_by_owner(&mut self, owner_id: AccountId) -> Result<Option<CartRecord>> {
        let row = sqlx::query("SELECT id, owner_id, version FROM carts WHERE owner_id = $1")
            .bind(owner_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => Ok(Some(self.cart_from_row(row).await?)),
            None => Ok(None),
        }
    }

    async fn save_cart(&mut self, cart: CartRecord, expected: Version) -> Result<Version> {
        let cart_id = cart.id;

        let new_version = if expected == Version::initial() {
            sqlx::query("INSERT INTO carts (id, owner_id, version) VALUES ($1, $2, 1)")
                .bind(cart_id.as_uuid())
                .bind(cart.owner_id.as_uuid())
                .execute(&mut *self.tx)
                .await
                .map_err(|e| {
                    // Someone else created this owner's cart first
                    if let sqlx::Error::Database(ref db_err) = e
                        && db_err.is_unique_violation()
                    {
                        return StoreError::ConcurrencyConflict {
                            cart_id,
                            expected,
                            actual: Version::first(),
                        };
                    }
                    StoreError::Database(e)
                })?;
            Version::first()
        } else {
            // Blocks behind a concurrent writer of the same row, then re-checks
            // the version once that writer has finished.
            let updated = sqlx::query(
                r#"
                UPDATE carts SET version = version + 1, updated_at = now()
                WHERE id = $1 AND version = $2
                "#,
            )
            .bind(cart_id.as_uuid())
            .bind(expected.as_i64())
            .execute(&mut *self.tx)
            .await?;

            if updated.rows_affected() == 0 {
                let actual = self.current_cart_version(cart_id).await?;
                return Err(StoreError::ConcurrencyConflict {
                    cart_id,
                    expected,
                    actual,
                });
            }
            expected.next()
        };

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        for item in &cart.items {
            sqlx::query(
                r#"
                INSERT INTO cart_items (id, cart_id, product_id, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(cart_id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(item.quantity)
            .bind(item.unit_price)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(new_version)
    }

    async fn load_order(&mut self, order_id: OrderId) -> Result<Option<OrderRecord>> {
        let row = sqlx::query("SELECT id, owner_id, created_at, status FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let orders = self.with_items(vec![row_to_order(&row)?]).await?;
        Ok(orders.into_iter().next())
    }

    async fn orders_for_owner(&mut self, owner_id: AccountId) -> Result<Vec<OrderRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, created_at, status
            FROM orders
            WHERE owner_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(owner_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        let orders = rows.iter().map(row_to_order).collect::<Result<Vec<_>>>()?;
        self.with_items(orders).await
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<()> {
        let order = OrderRecord::assign_identities(order);

        sqlx::query(
            r#"
            INSERT INTO orders (id, owner_id, created_at, status)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.owner_id.as_uuid())
        .bind(order.created_at)
        .bind(&order.status)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::Conflict(format!("order {} already exists", order.id));
            }
            StoreError::Database(e)
        })?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(order.id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(item.quantity)
            .bind(item.unit_price)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(())
    }

    async fn update_order_status(
        &mut self,
        order_id: OrderId,
        from: &str,
        to: &str,
    ) -> Result<()> {
        // Blocks behind a concurrent writer of the same row, then re-checks
        // the status once that writer has finished.
        let updated = sqlx::query("UPDATE orders SET status = $3 WHERE id = $1 AND status = $2")
            .bind(order_id.as_uuid())
            .bind(from)
            .bind(to)
            .execute(&mut *self.tx)
            .await?;

        if updated.rows_affected() == 0 {
            let actual: Option<String> =
                sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
                    .bind(order_id.as_uuid())
                    .fetch_optional(&mut *self.tx)
                    .await?;
            return Err(match actual {
                Some(actual) => StoreError::StatusConflict {
                    order_id,
                    expected: from.to_string(),
                    actual,
                },
                None => StoreError::NotFound(format!("order {order_id}")),
            });
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for PostgresStore {
    async fn create_account(&self, account: AccountRecord) -> Result<()> {
        let credential = &account.credential;

        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, email, created_at, password_digest, password_salt, hash_algorithm,
                hash_memory_kib, hash_iterations, hash_parallelism, hash_output_len
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(&account.email)
        .bind(account.created_at)
        .bind(&credential.digest)
        .bind(&credential.salt)
        .bind(&credential.algorithm)
        .bind(credential.memory_kib)
        .bind(credential.iterations)
        .bind(credential.parallelism)
        .bind(credential.output_len)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::Conflict(format!("email {} already registered", account.email));
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<AccountRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, created_at, password_digest, password_salt, hash_algorithm,
                   hash_memory_kib, hash_iterations, hash_parallelism, hash_output_len
            FROM accounts
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn find_account(&self, account_id: AccountId) -> Result<Option<AccountRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, email, created_at, password_digest, password_salt, hash_algorithm,
                   hash_memory_kib, hash_iterations, hash_parallelism, hash_output_len
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn update_credential(
        &self,
        account_id: AccountId,
        credential: CredentialRecord,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE accounts SET
                password_digest = $2,
                password_salt = $3,
                hash_algorithm = $4,
                hash_memory_kib = $5,
                hash_iterations = $6,
                hash_parallelism = $7,
                hash_output_len = $8
            WHERE id = $1
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(&credential.digest)
        .bind(&credential.salt)
        .bind(&credential.algorithm)
        .bind(credential.memory_kib)
        .bind(credential.iterations)
        .bind(credential.parallelism)
        .bind(credential.output_len)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("account {account_id}")));
        }
        Ok(())
    }
}

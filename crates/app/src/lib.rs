//! Composition root for the online store core.
//!
//! Reads [`AppConfig`], picks a store backend and wires the cart, checkout,
//! order and authentication services over it. Nothing here holds business
//! rules; every dependency is passed in explicitly.

pub mod config;
pub mod telemetry;

use std::sync::Arc;

use auth::{AuthService, PasswordError, PasswordHasher, TokenError, TokenService};
use common::{Clock, SystemClock};
use domain::{CartService, CheckoutService, OrderService};
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use store::{AccountStore, InMemoryStore, PostgresStore, Store};
use thiserror::Error;

pub use config::{AppConfig, ConfigError, LogFormat};

/// Errors raised while starting the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("token service error: {0}")]
    Token(#[from] TokenError),

    #[error("password hasher error: {0}")]
    Password(#[from] PasswordError),

    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("failed to initialise tracing: {0}")]
    Telemetry(String),

    #[error("failed to install metrics recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// Every service of the application, sharing one store.
pub struct Services<S: Store + AccountStore + Clone> {
    pub carts: CartService<S>,
    pub checkout: CheckoutService<S>,
    pub orders: OrderService<S>,
    pub auth: AuthService<S>,
}

impl<S: Store + AccountStore + Clone> Services<S> {
    /// Wires all services over `store`.
    pub fn new(store: S, config: &AppConfig, clock: Arc<dyn Clock>) -> Result<Self, AppError> {
        let hasher = PasswordHasher::new(config.password)?;
        let tokens = TokenService::new(config.token_config(), clock.clone())?;

        Ok(Self {
            carts: CartService::new(store.clone()),
            checkout: CheckoutService::new(store.clone(), clock.clone()),
            orders: OrderService::new(store.clone()),
            auth: AuthService::new(store, hasher, tokens, clock),
        })
    }
}

/// The services running over whichever backend was configured.
pub enum Backend {
    InMemory(Services<InMemoryStore>),
    Postgres(Services<PostgresStore>),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::InMemory(_) => "in-memory",
            Backend::Postgres(_) => "postgres",
        }
    }
}

/// Builds the services described by `config`.
///
/// With a `DATABASE_URL` this connects to `PostgreSQL` and applies pending
/// migrations; otherwise the in-memory store is used.
#[tracing::instrument(skip_all)]
pub async fn bootstrap(config: &AppConfig) -> Result<Backend, AppError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let Some(database_url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, using the in-memory store");
        let services = Services::new(InMemoryStore::new(), config, clock)?;
        return Ok(Backend::InMemory(services));
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(database_url.expose_secret())
        .await?;
    tracing::info!("database pool created");

    let store = PostgresStore::new(pool);
    store.run_migrations().await?;
    tracing::info!("migrations applied");

    let services = Services::new(store, config, clock)?;
    Ok(Backend::Postgres(services))
}

//! Account registration, login and token authentication.

use std::sync::Arc;

use common::{AccountId, Clock};
use secrecy::{ExposeSecret, SecretString};
use store::{AccountRecord, AccountStore, StoreError};

use crate::email::Email;
use crate::error::AuthError;
use crate::password::{HashedPassword, PasswordHasher, Verification};
use crate::token::{IssuedToken, TokenService};

/// Minimum password length, in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Service for authenticating accounts.
///
/// Unknown emails and wrong passwords fail the same way and take about
/// the same time: a login for an unknown email still runs one password
/// verification against a decoy hash.
pub struct AuthService<A: AccountStore> {
    accounts: A,
    hasher: PasswordHasher,
    tokens: TokenService,
    clock: Arc<dyn Clock>,
}

impl<A: AccountStore> AuthService<A> {
    pub fn new(
        accounts: A,
        hasher: PasswordHasher,
        tokens: TokenService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            hasher,
            tokens,
            clock,
        }
    }

    pub fn accounts(&self) -> &A {
        &self.accounts
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Registers a new account and returns its id.
    #[tracing::instrument(skip(self, password))]
    pub async fn register(
        &self,
        email: &str,
        password: SecretString,
    ) -> Result<AccountId, AuthError> {
        let email = Email::parse(email)?;
        if password.expose_secret().chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let hashed = self.hasher.hash_blocking(password).await?;
        let account_id = AccountId::new();
        let record = AccountRecord {
            id: account_id,
            email: email.into_inner(),
            credential: hashed.to_record(),
            created_at: self.clock.now(),
        };

        match self.accounts.create_account(record).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(AuthError::AccountAlreadyExists),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(%account_id, "account registered");
        Ok(account_id)
    }

    /// Checks an email and password and issues an access token.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: SecretString) -> Result<IssuedToken, AuthError> {
        let result = self.check_credentials(email, password).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(AuthError::InvalidCredentials) => "invalid_credentials",
            Err(_) => "error",
        };
        metrics::counter!("auth_login_total", "outcome" => outcome).increment(1);

        let account_id = result?;
        Ok(self.tokens.issue(account_id)?)
    }

    /// Validates an access token and returns the account it was issued to.
    #[tracing::instrument(skip_all)]
    pub async fn authenticate(&self, token: &str) -> Result<AccountId, AuthError> {
        Ok(self.tokens.validate(token)?)
    }

    async fn check_credentials(
        &self,
        email: &str,
        password: SecretString,
    ) -> Result<AccountId, AuthError> {
        let account = match Email::parse(email) {
            Ok(email) => self.accounts.find_account_by_email(email.as_str()).await?,
            Err(_) => None,
        };

        let Some(account) = account else {
            self.reject_with_decoy(password).await?;
            tracing::info!("login failed: unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        let stored = match HashedPassword::from_record(&account.credential) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(account_id = %account.id, error = %e, "stored credential unreadable");
                self.reject_with_decoy(password).await?;
                return Err(AuthError::InvalidCredentials);
            }
        };

        let upgraded = match self
            .hasher
            .verify_and_upgrade_blocking(password, stored)
            .await?
        {
            Verification::Rejected => {
                tracing::info!(account_id = %account.id, "login failed: wrong password");
                return Err(AuthError::InvalidCredentials);
            }
            Verification::Accepted { upgraded } => upgraded,
        };

        if let Some(upgraded) = upgraded {
            match self
                .accounts
                .update_credential(account.id, upgraded.to_record())
                .await
            {
                Ok(()) => tracing::info!(account_id = %account.id, "credential rehashed"),
                Err(e) => {
                    tracing::warn!(account_id = %account.id, error = %e, "credential rehash not saved")
                }
            }
        }

        tracing::info!(account_id = %account.id, "login succeeded");
        Ok(account.id)
    }

    async fn reject_with_decoy(&self, password: SecretString) -> Result<(), AuthError> {
        self.hasher
            .verify_blocking(password, self.hasher.decoy())
            .await?;
        Ok(())
    }
}

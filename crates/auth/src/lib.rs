//! Account authentication for the online store.
//!
//! - [`PasswordHasher`] derives salted Argon2id hashes and verifies them in
//!   constant time.
//! - [`TokenService`] issues and validates HS256-signed access tokens.
//! - [`AuthService`] ties both to an [`AccountStore`](store::AccountStore).

pub mod email;
pub mod error;
pub mod password;
pub mod service;
pub mod token;

pub use email::{Email, EmailError};
pub use error::{AuthError, PasswordError, TokenError};
pub use password::{HashParams, HashedPassword, PasswordHasher, Verification};
pub use service::{AuthService, MIN_PASSWORD_LEN};
pub use token::{IssuedToken, TokenConfig, TokenService};

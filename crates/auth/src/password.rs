//! Password hashing with Argon2id.
//!
//! Every hash carries its own salt and the work-factor parameters that
//! produced it, so raising the parameters later never invalidates stored
//! credentials; they are verified with their own parameters and upgraded on
//! the next successful login.

use argon2::password_hash::Output;
use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use store::CredentialRecord;

use crate::error::PasswordError;

/// Name stored with every credential produced here.
pub const ALGORITHM: &str = "argon2id";

/// Length of the random salt generated for each hash.
pub const SALT_LEN: usize = 16;

const MIN_OUTPUT_LEN: usize = 16;
const MAX_OUTPUT_LEN: usize = 64;

/// Argon2id work-factor parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub output_len: usize,
}

impl Default for HashParams {
    /// OWASP's recommended Argon2id baseline (19 MiB, 2 passes, 1 lane).
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
            output_len: 32,
        }
    }
}

impl HashParams {
    fn to_argon2(self) -> Result<Params, PasswordError> {
        if !(MIN_OUTPUT_LEN..=MAX_OUTPUT_LEN).contains(&self.output_len) {
            return Err(PasswordError::InvalidParams(format!(
                "output length {} outside {MIN_OUTPUT_LEN}..={MAX_OUTPUT_LEN}",
                self.output_len
            )));
        }
        Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(self.output_len),
        )
        .map_err(|e| PasswordError::InvalidParams(e.to_string()))
    }

    /// Returns true if any work factor is below `target`'s.
    fn weaker_than(&self, target: &HashParams) -> bool {
        self.memory_kib < target.memory_kib
            || self.iterations < target.iterations
            || self.parallelism < target.parallelism
            || self.output_len < target.output_len
    }
}

/// A derived password digest with the salt and parameters that produced it.
#[derive(Clone, PartialEq, Eq)]
pub struct HashedPassword {
    digest: Vec<u8>,
    salt: Vec<u8>,
    params: HashParams,
}

impl HashedPassword {
    pub fn digest(&self) -> &[u8] {
        &self.digest
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn params(&self) -> HashParams {
        self.params
    }

    /// Converts the hash into its stored form.
    pub fn to_record(&self) -> CredentialRecord {
        CredentialRecord {
            digest: self.digest.clone(),
            salt: self.salt.clone(),
            algorithm: ALGORITHM.to_string(),
            memory_kib: to_column(self.params.memory_kib),
            iterations: to_column(self.params.iterations),
            parallelism: to_column(self.params.parallelism),
            output_len: to_column(self.params.output_len),
        }
    }

    /// Reads a stored credential.
    pub fn from_record(record: &CredentialRecord) -> Result<Self, PasswordError> {
        if record.algorithm != ALGORITHM {
            return Err(PasswordError::MalformedCredential(format!(
                "unsupported algorithm {:?}",
                record.algorithm
            )));
        }

        let field = |name: &str, value: i32| {
            u32::try_from(value).map_err(|_| {
                PasswordError::MalformedCredential(format!("negative {name}: {value}"))
            })
        };

        Ok(Self {
            digest: record.digest.clone(),
            salt: record.salt.clone(),
            params: HashParams {
                memory_kib: field("memory_kib", record.memory_kib)?,
                iterations: field("iterations", record.iterations)?,
                parallelism: field("parallelism", record.parallelism)?,
                output_len: field("output_len", record.output_len)? as usize,
            },
        })
    }
}

impl std::fmt::Debug for HashedPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashedPassword")
            .field("digest", &"[redacted]")
            .field("salt", &"[redacted]")
            .field("params", &self.params)
            .finish()
    }
}

fn to_column<T>(value: T) -> i32
where
    i32: TryFrom<T>,
{
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Outcome of [`PasswordHasher::verify_and_upgrade_blocking`].
#[derive(Debug)]
pub enum Verification {
    Rejected,
    /// The password matched. `upgraded` holds a fresh hash when the stored
    /// one was produced with weaker parameters.
    Accepted { upgraded: Option<HashedPassword> },
}

/// Derives and verifies salted password hashes.
///
/// Holds only the parameters new hashes are produced with; it is cheap to
/// copy into a blocking task.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    params: HashParams,
}

impl PasswordHasher {
    /// Creates a hasher, rejecting parameters Argon2 cannot run with.
    pub fn new(params: HashParams) -> Result<Self, PasswordError> {
        params.to_argon2()?;
        Ok(Self { params })
    }

    /// Parameters used for new hashes.
    pub fn params(&self) -> HashParams {
        self.params
    }

    /// Hashes a password with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<HashedPassword, PasswordError> {
        let mut salt = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        let digest = derive(password, &salt, self.params)?;
        Ok(HashedPassword {
            digest,
            salt,
            params: self.params,
        })
    }

    /// Checks a password against a stored hash.
    ///
    /// Uses the stored salt and parameters and compares digests in constant
    /// time. Malformed stored material verifies as false.
    pub fn verify(&self, password: &str, stored: &HashedPassword) -> bool {
        if stored.digest.len() != stored.params.output_len {
            return false;
        }
        let Ok(derived) = derive(password, &stored.salt, stored.params) else {
            return false;
        };

        match (Output::new(&derived), Output::new(&stored.digest)) {
            (Ok(derived), Ok(expected)) => derived == expected,
            _ => false,
        }
    }

    /// Returns true if `stored` was produced with weaker parameters than
    /// this hasher uses.
    pub fn needs_rehash(&self, stored: &HashedPassword) -> bool {
        stored.params.weaker_than(&self.params)
    }

    /// Runs [`hash`](Self::hash) on the blocking thread pool.
    pub async fn hash_blocking(
        &self,
        password: SecretString,
    ) -> Result<HashedPassword, PasswordError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash(password.expose_secret()))
            .await
            .map_err(|e| PasswordError::TaskFailed(e.to_string()))?
    }

    /// Runs [`verify`](Self::verify) on the blocking thread pool.
    pub async fn verify_blocking(
        &self,
        password: SecretString,
        stored: HashedPassword,
    ) -> Result<bool, PasswordError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.verify(password.expose_secret(), &stored))
            .await
            .map_err(|e| PasswordError::TaskFailed(e.to_string()))
    }

    /// Verifies a password and, if it matches a credential produced with
    /// weaker parameters, rehashes it with the current ones. Both steps run
    /// in one blocking task.
    pub async fn verify_and_upgrade_blocking(
        &self,
        password: SecretString,
        stored: HashedPassword,
    ) -> Result<Verification, PasswordError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || {
            let password = password.expose_secret();
            if !hasher.verify(password, &stored) {
                return Verification::Rejected;
            }
            if !hasher.needs_rehash(&stored) {
                return Verification::Accepted { upgraded: None };
            }
            match hasher.hash(password) {
                Ok(upgraded) => Verification::Accepted {
                    upgraded: Some(upgraded),
                },
                Err(e) => {
                    tracing::warn!(error = %e, "credential rehash failed");
                    Verification::Accepted { upgraded: None }
                }
            }
        })
        .await
        .map_err(|e| PasswordError::TaskFailed(e.to_string()))
    }

    /// A hash no password matches, costing as much to check as a real one.
    pub(crate) fn decoy(&self) -> HashedPassword {
        HashedPassword {
            digest: vec![0u8; self.params.output_len],
            salt: vec![0u8; SALT_LEN],
            params: self.params,
        }
    }
}

fn derive(password: &str, salt: &[u8], params: HashParams) -> Result<Vec<u8>, PasswordError> {
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2()?);
    let mut out = vec![0u8; params.output_len];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut out)
        .map_err(|e| PasswordError::Hashing(e.to_string()))?;
    Ok(out)
}

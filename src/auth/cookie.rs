//! HMAC-SHA256 signed account cookies.
//!
//! The login service sets an account cookie whose value is signed so that
//! the token service can trust it without server-side state:
//!
//! ```text
//! cookie = "{value}.{hex(HMAC-SHA256(secret, value))}"
//! ```
//!
//! # Example
//!
//! ```rust
//! use iiif_server::auth::AccountSigner;
//!
//! let signer = AccountSigner::new("my-secret-key");
//! let cookie = signer.sign("kiosk-null-ok");
//! assert_eq!(signer.verify(&cookie).unwrap(), "kiosk-null-ok");
//! ```

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// HMAC-SHA256 type alias
type HmacSha256 = Hmac<Sha256>;

/// Reasons an account cookie is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No account cookie was sent
    MissingCredentials,

    /// The cookie is not `value.signature` with a hex signature
    InvalidFormat,

    /// The signature does not match
    InvalidSignature,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingCredentials => write!(f, "No login details received"),
            AuthError::InvalidFormat => write!(f, "Invalid account cookie format"),
            AuthError::InvalidSignature => write!(f, "Invalid account cookie signature"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Signs and verifies account cookie values.
#[derive(Clone)]
pub struct AccountSigner {
    /// Secret key for HMAC computation
    secret_key: Vec<u8>,
}

impl std::fmt::Debug for AccountSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSigner").finish_non_exhaustive()
    }
}

impl AccountSigner {
    /// Create a signer with the given secret key.
    pub fn new(secret_key: impl AsRef<[u8]>) -> Self {
        Self {
            secret_key: secret_key.as_ref().to_vec(),
        }
    }

    /// Create a signer with a random 32 byte key.
    ///
    /// Cookies signed by one process are then not accepted after a restart.
    pub fn random() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    /// Signed cookie value for `value`.
    pub fn sign(&self, value: &str) -> String {
        format!("{}.{}", value, self.compute_signature(value))
    }

    /// Check a signed cookie and return the value it carries.
    pub fn verify<'a>(&self, cookie: &'a str) -> Result<&'a str, AuthError> {
        if cookie.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let (value, signature) = cookie.rsplit_once('.').ok_or(AuthError::InvalidFormat)?;
        let provided = hex::decode(signature).map_err(|_| AuthError::InvalidFormat)?;
        let expected = self.mac(value);

        if provided.ct_eq(&expected).into() {
            Ok(value)
        } else {
            Err(AuthError::InvalidSignature)
        }
    }

    fn mac(&self, value: &str) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret_key).expect("HMAC can take key of any size");
        mac.update(value.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    fn compute_signature(&self, value: &str) -> String {
        hex::encode(self.mac(value))
    }
}

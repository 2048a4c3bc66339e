//! SCRAM credential generation (RFC 5802).
//!
//! Derives the broker-side credential material for a plaintext password:
//! the broker stores only the salted, derived keys and can authenticate a
//! client without ever holding the raw password.
//!
//! Every call draws a fresh random salt, so two credentials generated
//! from the same password never compare equal.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{ConnectorError, ConnectorResult};
use crate::types::ScramMechanism;

/// Salt length in bytes, fixed at generation time.
pub const SALT_LEN: usize = 32;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 4096;

/// RFC 5802 context string for the client key.
const CLIENT_KEY_CONTEXT: &[u8] = b"Client Key";

/// RFC 5802 context string for the server key.
const SERVER_KEY_CONTEXT: &[u8] = b"Server Key";

/// Immutable SCRAM credential material for one principal.
///
/// Write-once, replace-never: an update is a brand-new credential with a
/// fresh salt, never a mutation of an existing one.
#[derive(Clone, PartialEq, Eq)]
pub struct ScramCredential {
    /// Mechanism the keys were derived for.
    pub mechanism: ScramMechanism,
    /// Base64-encoded H(client key).
    pub stored_key: String,
    /// Base64-encoded HMAC(salted key, "Server Key").
    pub server_key: String,
    /// Base64-encoded random salt.
    pub salt: String,
    /// PBKDF2 iteration count.
    pub iterations: u32,
}

impl std::fmt::Debug for ScramCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScramCredential")
            .field("mechanism", &self.mechanism)
            .field("stored_key", &"[REDACTED]")
            .field("server_key", &"[REDACTED]")
            .field("salt", &self.salt)
            .field("iterations", &self.iterations)
            .finish()
    }
}

struct DerivedKeys {
    stored_key: Vec<u8>,
    server_key: Vec<u8>,
}

/// Generate a SCRAM credential for a plaintext password.
///
/// The salt is drawn from the operating system CSPRNG on every call.
///
/// # Errors
///
/// - [`ConnectorError::InvalidCredentialInput`] when the password is empty
///   or `iterations` is zero.
/// - [`ConnectorError::CryptoUnavailable`] when an underlying primitive
///   cannot be instantiated. Callers must treat this as fatal.
pub fn generate_credential(
    password: &str,
    mechanism: ScramMechanism,
    iterations: u32,
) -> ConnectorResult<ScramCredential> {
    if password.is_empty() {
        return Err(ConnectorError::InvalidCredentialInput {
            message: "password must not be empty".to_string(),
        });
    }
    if iterations == 0 {
        return Err(ConnectorError::InvalidCredentialInput {
            message: "iterations must be positive".to_string(),
        });
    }

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let keys = derive_keys(password.as_bytes(), &salt, mechanism, iterations)?;

    Ok(ScramCredential {
        mechanism,
        stored_key: STANDARD.encode(&keys.stored_key),
        server_key: STANDARD.encode(&keys.server_key),
        salt: STANDARD.encode(salt),
        iterations,
    })
}

/// Re-derive the stored key from a candidate password and compare it with
/// the credential's.
///
/// # Errors
///
/// Fails when the credential's salt is not valid Base64 or a primitive
/// cannot be instantiated.
pub fn verify_password(password: &str, credential: &ScramCredential) -> ConnectorResult<bool> {
    let salt = STANDARD
        .decode(&credential.salt)
        .map_err(|e| ConnectorError::InvalidCredentialInput {
            message: format!("credential salt is not valid base64: {e}"),
        })?;

    let keys = derive_keys(
        password.as_bytes(),
        &salt,
        credential.mechanism,
        credential.iterations,
    )?;

    Ok(STANDARD.encode(keys.stored_key) == credential.stored_key)
}

fn derive_keys(
    password: &[u8],
    salt: &[u8],
    mechanism: ScramMechanism,
    iterations: u32,
) -> ConnectorResult<DerivedKeys> {
    match mechanism {
        ScramMechanism::Sha256 => derive_sha256(password, salt, iterations),
        ScramMechanism::Sha512 => derive_sha512(password, salt, iterations),
    }
}

fn derive_sha256(password: &[u8], salt: &[u8], iterations: u32) -> ConnectorResult<DerivedKeys> {
    let mut salted = [0u8; 32];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(password, salt, iterations, &mut salted)
        .map_err(|e| crypto_unavailable("PBKDF2-HMAC-SHA-256", &e))?;

    let client_key = hmac_sha256(&salted, CLIENT_KEY_CONTEXT)?;
    let stored_key = Sha256::digest(&client_key).to_vec();
    let server_key = hmac_sha256(&salted, SERVER_KEY_CONTEXT)?;

    Ok(DerivedKeys {
        stored_key,
        server_key,
    })
}

fn derive_sha512(password: &[u8], salt: &[u8], iterations: u32) -> ConnectorResult<DerivedKeys> {
    let mut salted = [0u8; 64];
    pbkdf2::pbkdf2::<Hmac<Sha512>>(password, salt, iterations, &mut salted)
        .map_err(|e| crypto_unavailable("PBKDF2-HMAC-SHA-512", &e))?;

    let client_key = hmac_sha512(&salted, CLIENT_KEY_CONTEXT)?;
    let stored_key = Sha512::digest(&client_key).to_vec();
    let server_key = hmac_sha512(&salted, SERVER_KEY_CONTEXT)?;

    Ok(DerivedKeys {
        stored_key,
        server_key,
    })
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> ConnectorResult<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| crypto_unavailable("HMAC-SHA-256", &e))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hmac_sha512(key: &[u8], data: &[u8]) -> ConnectorResult<Vec<u8>> {
    let mut mac = Hmac::<Sha512>::new_from_slice(key)
        .map_err(|e| crypto_unavailable("HMAC-SHA-512", &e))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn crypto_unavailable(primitive: &str, err: &dyn std::fmt::Display) -> ConnectorError {
    ConnectorError::CryptoUnavailable {
        message: format!("{primitive} could not be instantiated: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_password_produces_different_credentials() {
        let a = generate_credential("hunter2", ScramMechanism::Sha512, DEFAULT_ITERATIONS).unwrap();
        let b = generate_credential("hunter2", ScramMechanism::Sha512, DEFAULT_ITERATIONS).unwrap();

        assert_ne!(a.salt, b.salt);
        assert_ne!(a.stored_key, b.stored_key);
        assert_ne!(a.server_key, b.server_key);
    }

    #[test]
    fn key_lengths_match_mechanism_hash_width() {
        let sha256 =
            generate_credential("pw", ScramMechanism::Sha256, DEFAULT_ITERATIONS).unwrap();
        let sha512 =
            generate_credential("pw", ScramMechanism::Sha512, DEFAULT_ITERATIONS).unwrap();

        assert_eq!(STANDARD.decode(&sha256.stored_key).unwrap().len(), 32);
        assert_eq!(STANDARD.decode(&sha256.server_key).unwrap().len(), 32);
        assert_eq!(STANDARD.decode(&sha512.stored_key).unwrap().len(), 64);
        assert_eq!(STANDARD.decode(&sha512.server_key).unwrap().len(), 64);
        assert_eq!(STANDARD.decode(&sha512.salt).unwrap().len(), SALT_LEN);
    }

    #[test]
    fn derivation_is_reproducible_with_same_salt() {
        let credential =
            generate_credential("correct horse", ScramMechanism::Sha256, 1000).unwrap();

        assert!(verify_password("correct horse", &credential).unwrap());
        assert!(!verify_password("wrong horse", &credential).unwrap());
    }

    #[test]
    fn verify_respects_mechanism() {
        let credential = generate_credential("pw", ScramMechanism::Sha512, 1000).unwrap();
        assert!(verify_password("pw", &credential).unwrap());
    }

    #[test]
    fn empty_password_rejected() {
        let result = generate_credential("", ScramMechanism::Sha256, DEFAULT_ITERATIONS);
        assert!(matches!(
            result,
            Err(ConnectorError::InvalidCredentialInput { .. })
        ));
    }

    #[test]
    fn zero_iterations_rejected() {
        let result = generate_credential("pw", ScramMechanism::Sha256, 0);
        assert!(matches!(
            result,
            Err(ConnectorError::InvalidCredentialInput { .. })
        ));
    }

    #[test]
    fn iteration_count_is_recorded_verbatim() {
        let credential = generate_credential("pw", ScramMechanism::Sha256, 8192).unwrap();
        assert_eq!(credential.iterations, 8192);
        assert_eq!(credential.mechanism, ScramMechanism::Sha256);
    }

    #[test]
    fn debug_redacts_derived_keys() {
        let credential = generate_credential("pw", ScramMechanism::Sha256, 1000).unwrap();
        let debug = format!("{credential:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(&credential.stored_key));
    }
}

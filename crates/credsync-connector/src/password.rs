//! Random password generation for provisioned principals.
//!
//! Passwords exist only for the instant between generation and credential
//! derivation; they are never persisted, so every reconciliation cycle
//! draws fresh ones.

use rand::rngs::OsRng;
use rand::Rng;

/// Printable alphabet used for generated passwords.
///
/// Broad mix of alphanumerics and punctuation; quotes, backslash, and
/// whitespace are left out so passwords survive any quoting layer between
/// here and the broker.
const PASSWORD_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!#$%&()*+,-./:;<=>?@[]^_{|}~";

/// Default generated password length.
pub const DEFAULT_PASSWORD_LEN: usize = 64;

/// Generate a random password of `len` characters.
///
/// Drawn from the operating system CSPRNG.
#[must_use]
pub fn generate_password(len: usize) -> String {
    let mut rng = OsRng;
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..PASSWORD_ALPHABET.len());
            PASSWORD_ALPHABET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generates_requested_length() {
        assert_eq!(generate_password(DEFAULT_PASSWORD_LEN).len(), 64);
        assert_eq!(generate_password(16).len(), 16);
        assert_eq!(generate_password(0).len(), 0);
    }

    #[test]
    fn only_contains_alphabet_characters() {
        let password = generate_password(2048);
        assert!(password
            .bytes()
            .all(|b| PASSWORD_ALPHABET.contains(&b)));
    }

    #[test]
    fn alphabet_has_no_quoting_hazards() {
        for hazard in [b'"', b'\'', b'\\', b' ', b'`'] {
            assert!(!PASSWORD_ALPHABET.contains(&hazard));
        }
    }

    #[test]
    fn passwords_are_unique() {
        let passwords: HashSet<String> = (0..100).map(|_| generate_password(64)).collect();
        assert_eq!(passwords.len(), 100);
    }
}

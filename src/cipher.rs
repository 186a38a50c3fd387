//! Page payload decryption
//!
//! The reader ships vector pages with every decimal digit after the first `>` shifted by a
//! repeating numeric key. This is light obfuscation, not security: the key is a short digit
//! string taken from the session credential, and the transform is a per-digit additive shift
//! over the alphabet `0-9`. It is kept bit-compatible with the reader and must not be
//! "strengthened".
//!
//! # Example
//!
//! ```
//! use folio_dl::cipher::{CipherKey, decrypt_with, encrypt};
//!
//! let key = CipherKey::from_credential("37:session-tail").unwrap();
//! let plain = r#"<svg viewBox="0 0 100 200">"#;
//! let scrambled = encrypt(plain, &key);
//! assert_eq!(decrypt_with(&scrambled, &key), plain);
//! ```

use crate::error::CipherError;

/// Character that ends the pass-through header
pub const SENTINEL: char = '>';

/// A non-empty sequence of key digits, consumed cyclically
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CipherKey {
    digits: Vec<u8>,
}

impl CipherKey {
    /// Parse a key made only of decimal digits
    pub fn parse(key: &str) -> Result<Self, CipherError> {
        if key.is_empty() {
            return Err(CipherError::EmptyKey);
        }

        let digits = key
            .chars()
            .map(|c| {
                c.to_digit(10)
                    .map(|d| d as u8)
                    .ok_or(CipherError::NonDigitKey(c))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { digits })
    }

    /// Derive the key from a session credential: the prefix up to the first `:`
    pub fn from_credential(credential: &str) -> Result<Self, CipherError> {
        let prefix = credential.split(':').next().unwrap_or_default();
        Self::parse(prefix.trim())
    }

    /// Number of digits in the key
    pub fn len(&self) -> usize {
        self.digits.len()
    }

    /// Always false; a parsed key has at least one digit
    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }
}

/// Decrypt `payload` with a raw key string
pub fn decrypt(payload: &str, key: &str) -> Result<String, CipherError> {
    Ok(decrypt_with(payload, &CipherKey::parse(key)?))
}

/// Decrypt `payload` with a parsed key
///
/// Characters up to and including the first [`SENTINEL`] are copied unchanged. After it, each
/// digit `c` becomes `(c - k + 10) % 10` where `k` is the next key digit; other characters are
/// copied and do not advance the key.
pub fn decrypt_with(payload: &str, key: &CipherKey) -> String {
    shift_digits(payload, key, |c, k| (c + 10 - k) % 10)
}

/// Inverse of [`decrypt_with`]
pub fn encrypt(plaintext: &str, key: &CipherKey) -> String {
    shift_digits(plaintext, key, |c, k| (c + k) % 10)
}

fn shift_digits(input: &str, key: &CipherKey, op: impl Fn(u8, u8) -> u8) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_body = false;
    let mut cursor = 0usize;

    for ch in input.chars() {
        if !in_body {
            out.push(ch);
            if ch == SENTINEL {
                in_body = true;
            }
            continue;
        }

        match ch.to_digit(10) {
            Some(d) => {
                let k = key.digits[cursor % key.digits.len()];
                cursor += 1;
                out.push(char::from(b'0' + op(d as u8, k)));
            }
            None => out.push(ch),
        }
    }

    out
}

//! Login password generation for tenant roles.

use std::fmt;

use rand::Rng;
use secrecy::{ExposeSecret, SecretString};

/// Base-32 digits, lowercase. Safe inside a SQL single-quoted literal and a
/// URI userinfo component without escaping.
pub const PASSWORD_ALPHABET: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// Each alphabet symbol carries 5 bits; 26 symbols give 130 bits of entropy.
pub const PASSWORD_LEN: usize = 26;

/// Generated role password.
///
/// Wraps the secret so it never shows up in `Debug` output or logs. Use
/// [`Password::expose`] only where the literal must be sent to the server or
/// returned to the application.
#[derive(Clone)]
pub struct Password(SecretString);

impl Password {
    /// Draw a new password from the thread-local CSPRNG (seeded from the OS).
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let text: String = (0..PASSWORD_LEN)
            .map(|_| PASSWORD_ALPHABET[rng.random_range(0..PASSWORD_ALPHABET.len())] as char)
            .collect();
        Self(SecretString::new(text.into()))
    }

    /// Wrap a password read back from storage.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(SecretString::new(value.into().into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// The password as a SQL string literal, quotes included.
    pub fn sql_literal(&self) -> String {
        format!("'{}'", self.expose().replace('\'', "''"))
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

//! Window entry tokens.
//!
//! Every admission attempt is stored under its own token, so two attempts carrying the
//! same microsecond timestamp still land as two distinct members of the window.

use rand::{TryRngCore, rngs::OsRng};
use uuid::Uuid;

use crate::ZwindowError;

/// Produces unique member names for window entries.
pub trait TokenSource: Send + Sync {
    /// Return a fresh token, or [`ZwindowError::EntropyFailure`] if none can be made.
    fn next_token(&self) -> Result<String, ZwindowError>;
}

/// [`TokenSource`] drawing 128 bits per token from the operating system's CSPRNG.
///
/// There is no fallback: if the OS source fails, the call fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsRngTokenSource;

impl TokenSource for OsRngTokenSource {
    fn next_token(&self) -> Result<String, ZwindowError> {
        let mut bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|err| ZwindowError::EntropyFailure(err.to_string()))?;

        Ok(format_token(bytes))
    }
}

/// Format 16 bytes as upper-case hex grouped 4-2-2-2-6, e.g.
/// `0A1B2C3D-4E5F-6071-8293-A4B5C6D7E8F9`.
///
/// The bytes are used verbatim; no UUID version or variant bits are set.
pub fn format_token(bytes: [u8; 16]) -> String {
    format!("{:X}", Uuid::from_bytes(bytes))
}

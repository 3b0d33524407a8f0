// ABOUTME: Secure random string generation over the fixed 64 character alphabet
// ABOUTME: Backs codes, token halves, correlation keys, login ids and PGP challenges
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use crate::constants::secrets::ALPHABET;
use crate::errors::{AppError, AppResult};
use ring::rand::{SecureRandom, SystemRandom};

/// Generate `length` characters drawn uniformly from the secret alphabet
///
/// The alphabet has 64 symbols so reducing a byte modulo its length is unbiased.
///
/// # Errors
///
/// Returns an internal error if the system RNG fails
pub fn random_string(length: usize) -> AppResult<String> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; length];

    rng.fill(&mut bytes).map_err(|e| {
        tracing::error!(
            error = ?e,
            "CRITICAL: SystemRandom failed - cannot generate secure random bytes"
        );
        AppError::internal("System RNG failure - server cannot operate securely")
    })?;

    Ok(bytes
        .iter()
        .map(|b| char::from(ALPHABET[usize::from(*b) % ALPHABET.len()]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_and_alphabet() {
        let value = random_string(64).unwrap();
        assert_eq!(value.len(), 64);
        assert!(value.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn test_alphabet_divides_a_byte() {
        assert_eq!(256 % ALPHABET.len(), 0);
    }

    #[test]
    fn test_values_differ() {
        assert_ne!(random_string(24).unwrap(), random_string(24).unwrap());
    }
}

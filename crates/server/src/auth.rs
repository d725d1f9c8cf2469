//! Password hashing and verification.
//!
//! PBKDF2-HMAC-SHA256 with a per-hash random salt. Stored form:
//! `pbkdf2$<iterations>$<salt_b64>$<hash_b64>`. Verification goes through
//! `ring::pbkdf2::verify`, which compares in constant time.

use std::num::NonZeroU32;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::warn;

static ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;
const ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

/// Hash a password for storage.
pub fn hash_password(password: &str) -> String {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt).expect("system randomness unavailable");

    let mut hash = [0u8; HASH_LEN];
    let iterations = NonZeroU32::new(ITERATIONS).expect("nonzero iteration count");
    pbkdf2::derive(ALGORITHM, iterations, &salt, password.as_bytes(), &mut hash);

    format!(
        "pbkdf2${}${}${}",
        ITERATIONS,
        BASE64.encode(salt),
        BASE64.encode(hash)
    )
}

/// Verify a password against a stored hash. Any malformed stored value
/// fails verification rather than erroring.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (scheme, iterations, salt, hash) = match (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) {
        (Some(scheme), Some(iterations), Some(salt), Some(hash), None) => {
            (scheme, iterations, salt, hash)
        }
        _ => {
            warn!(component = "auth", event = "auth.malformed_hash");
            return false;
        }
    };
    if scheme != "pbkdf2" {
        warn!(component = "auth", event = "auth.unknown_scheme", scheme);
        return false;
    }
    let Some(iterations) = iterations.parse::<u32>().ok().and_then(NonZeroU32::new) else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (BASE64.decode(salt), BASE64.decode(hash)) else {
        return false;
    };

    pbkdf2::verify(ALGORITHM, iterations, &salt, password.as_bytes(), &hash).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let stored = hash_password("pw1");
        assert!(verify_password("pw1", &stored));
    }

    #[test]
    fn wrong_password_fails() {
        let stored = hash_password("pw1");
        assert!(!verify_password("pw2", &stored));
    }

    #[test]
    fn salts_differ_between_hashes() {
        assert_ne!(hash_password("pw1"), hash_password("pw1"));
    }

    #[test]
    fn malformed_stored_value_fails_closed() {
        assert!(!verify_password("pw1", ""));
        assert!(!verify_password("pw1", "pbkdf2$abc$zzz"));
        assert!(!verify_password("pw1", "bcrypt$10$xxxx$yyyy"));
        assert!(!verify_password("pw1", "pbkdf2$100000$!!$!!"));
    }
}

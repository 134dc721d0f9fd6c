use bcrypt::{hash, verify, DEFAULT_COST};
use tracing::error;

/// Bcrypt reads at most 72 bytes of input. Longer passwords are silently
/// truncated before hashing, and verification applies the same cut so the
/// two sides always agree on the bytes used.
pub const MAX_PASSWORD_BYTES: usize = 72;

fn truncated(plain: &str) -> &[u8] {
    let bytes = plain.as_bytes();
    &bytes[..bytes.len().min(MAX_PASSWORD_BYTES)]
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    hash(truncated(plain), DEFAULT_COST).map_err(|e| {
        error!(error = %e, "bcrypt hash error");
        anyhow::anyhow!(e.to_string())
    })
}

/// Never fails: a malformed hash or any internal error verifies as false.
pub fn verify_password(plain: &str, hashed: &str) -> bool {
    verify(truncated(plain), hashed).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(verify_password(password, &hash));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let password = "correct-horse-battery-staple";
        let hash = hash_password(password).expect("hashing should succeed");
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn verify_is_false_on_malformed_hash() {
        assert!(!verify_password("anything", "not-a-valid-hash"));
    }

    #[test]
    fn over_length_passwords_are_truncated() {
        let long = "a".repeat(80);
        let hash = hash_password(&long).expect("hashing should succeed");

        // Only the first 72 bytes count, so a password that differs past
        // that boundary still verifies.
        let mut past_boundary = "a".repeat(72);
        past_boundary.push_str("bbbbbbbb");
        assert!(verify_password(&past_boundary, &hash));

        // A difference inside the first 72 bytes does not.
        let mut inside = "a".repeat(71);
        inside.push('b');
        assert!(!verify_password(&inside, &hash));
    }
}

/// Opaque login tokens
///
/// Tokens carry no claims. They are random strings that only mean something
/// through the `auth_tokens` table, which makes logout a plain row delete.
///
/// # Format
///
/// `kmt_` followed by 40 base62 characters (44 characters total). The
/// database stores the lowercase hex SHA-256 digest.
///
/// # Example
///
/// ```
/// use kanmind_shared::auth::token::{generate_token, hash_token, validate_token_format};
///
/// let (token, hash) = generate_token();
/// assert!(validate_token_format(&token));
/// assert_eq!(hash, hash_token(&token));
/// ```

use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

/// Prefix that marks a KanMind token
pub const TOKEN_PREFIX: &str = "kmt_";

const TOKEN_RANDOM_LENGTH: usize = 40;

/// Total token length
pub const TOKEN_LENGTH: usize = TOKEN_PREFIX.len() + TOKEN_RANDOM_LENGTH;

/// Generates a fresh token
///
/// Returns `(plaintext, sha256_hex)`. Only the hash should be persisted.
pub fn generate_token() -> (String, String) {
    let random_part: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_RANDOM_LENGTH)
        .map(char::from)
        .collect();

    let token = format!("{TOKEN_PREFIX}{random_part}");
    let hash = hash_token(&token);

    (token, hash)
}

/// Hex-encoded SHA-256 digest of a token
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Cheap shape check run before any database lookup
pub fn validate_token_format(token: &str) -> bool {
    token.len() == TOKEN_LENGTH
        && token
            .strip_prefix(TOKEN_PREFIX)
            .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_alphanumeric()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_format() {
        let (token, hash) = generate_token();

        assert!(token.starts_with(TOKEN_PREFIX));
        assert_eq!(token.len(), TOKEN_LENGTH);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_token_uniqueness() {
        let tokens: std::collections::HashSet<String> =
            (0..100).map(|_| generate_token().0).collect();
        assert_eq!(tokens.len(), 100);
    }

    #[test]
    fn test_hash_token_is_deterministic() {
        assert_eq!(hash_token("kmt_abc"), hash_token("kmt_abc"));
        assert_ne!(hash_token("kmt_abc"), hash_token("kmt_abd"));
    }

    #[test]
    fn test_hash_token_known_value() {
        // sha256("abc")
        assert_eq!(
            hash_token("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_validate_token_format() {
        let (token, _) = generate_token();
        assert!(validate_token_format(&token));

        assert!(!validate_token_format("kmt_short"));
        assert!(!validate_token_format(&token.replacen("kmt_", "abc_", 1)));
        assert!(!validate_token_format(&format!("{}!", &token[..TOKEN_LENGTH - 1])));
        assert!(!validate_token_format(""));
    }
}

/// Password hashing and password policy
///
/// Hashes are Argon2id in PHC string format. The parameters travel inside
/// the hash, so verification keeps working if they are raised later.
///
/// # Parameters
///
/// - Memory: 64 MiB
/// - Iterations: 3
/// - Parallelism: 4
/// - Output: 32 bytes
///
/// # Example
///
/// ```
/// use kanmind_shared::auth::password::{hash_password, verify_password};
///
/// # fn example() -> Result<(), kanmind_shared::auth::password::PasswordError> {
/// let hash = hash_password("Sprint#Planning1")?;
/// assert!(verify_password("Sprint#Planning1", &hash)?);
/// assert!(!verify_password("sprint#planning1", &hash)?);
/// # Ok(())
/// # }
/// ```

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

/// Minimum accepted password length in characters
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum accepted password length in characters
pub const MAX_PASSWORD_LENGTH: usize = 128;

/// Error type for password hashing operations
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// Hashing failed
    #[error("failed to hash password: {0}")]
    Hash(String),

    /// The stored hash could not be parsed
    #[error("invalid password hash: {0}")]
    InvalidHash(String),

    /// Verification failed for a reason other than a mismatch
    #[error("failed to verify password: {0}")]
    Verify(String),
}

fn hasher() -> Result<Argon2<'static>, PasswordError> {
    let params = Params::new(65536, 3, 4, Some(32))
        .map_err(|e| PasswordError::Hash(format!("invalid parameters: {e}")))?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashes `password` with a fresh random salt
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::Hash(e.to_string()))?;

    Ok(hash.to_string())
}

/// Checks `password` against a stored PHC hash
///
/// A mismatch is `Ok(false)`; only malformed hashes are errors.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::Verify(e.to_string())),
    }
}

/// Lists every way `password` falls short of the password policy
///
/// An empty result means the password is acceptable. The policy requires
/// 8 to 128 characters with an upper-case letter, a lower-case letter, a
/// digit and a symbol, and rejects passwords that contain the local part of
/// the account's email.
pub fn check_password_policy(password: &str, email: &str) -> Vec<String> {
    let mut problems = Vec::new();
    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        problems.push(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        ));
    }
    if length > MAX_PASSWORD_LENGTH {
        problems.push(format!(
            "Password must be at most {MAX_PASSWORD_LENGTH} characters long"
        ));
    }
    if !password.chars().any(char::is_uppercase) {
        problems.push("Password must contain an uppercase letter".to_string());
    }
    if !password.chars().any(char::is_lowercase) {
        problems.push("Password must contain a lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("Password must contain a digit".to_string());
    }
    if password.chars().all(char::is_alphanumeric) {
        problems.push("Password must contain a special character".to_string());
    }

    let local_part = email.split('@').next().unwrap_or_default().to_lowercase();
    if local_part.chars().count() >= 3 && password.to_lowercase().contains(&local_part) {
        problems.push("Password must not contain your email address".to_string());
    }

    problems
}

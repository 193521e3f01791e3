/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id hashing and the password policy
/// - [`token`]: opaque login token generation and hashing
/// - [`middleware`]: resolving the `Authorization` header to an [`middleware::AuthContext`]
/// - [`authorization`]: who may do what on a board
///
/// # Example
///
/// ```
/// use kanmind_shared::auth::password::{hash_password, verify_password};
/// use kanmind_shared::auth::token::generate_token;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("Kanban#Flow9")?;
/// assert!(verify_password("Kanban#Flow9", &hash)?);
///
/// let (token, token_hash) = generate_token();
/// assert!(token.starts_with("kmt_"));
/// assert_eq!(token_hash.len(), 64);
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod middleware;
pub mod password;
pub mod token;

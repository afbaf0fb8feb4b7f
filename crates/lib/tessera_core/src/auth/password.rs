//! Password hashing via bcrypt.

use super::AuthError;

/// Default bcrypt cost factor.
pub const BCRYPT_COST: u32 = 10;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Hash a password with bcrypt at `cost`.
pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, cost)?)
}

/// Verify a password against a bcrypt hash. Comparison is constant-time.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    Ok(bcrypt::verify(password, hash)?)
}

/// Reject passwords that do not meet the minimum policy.
pub fn check_policy(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

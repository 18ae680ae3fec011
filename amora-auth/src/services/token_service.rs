use jsonwebtoken::{encode, EncodingKey, Header};
use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use amora_shared::errors::AppError;
use amora_shared::types::auth::{Claims, TokenPair, UserRole};

pub fn create_access_token(
    user_id: Uuid,
    role: UserRole,
    secret: &str,
    ttl_secs: i64,
) -> Result<String, AppError> {
    let claims = Claims::new(user_id, role, ttl_secs);
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(format!("JWT encoding failed: {e}")))
}

/// 32 random bytes, hex encoded. Used for refresh and reset tokens.
pub fn create_opaque_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}

/// Only the SHA-256 of an opaque token or OTP code is stored.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Returns the pair and the hash of its refresh token for storage.
pub fn create_token_pair(
    user_id: Uuid,
    role: UserRole,
    secret: &str,
    access_ttl: i64,
) -> Result<(TokenPair, String), AppError> {
    let access_token = create_access_token(user_id, role, secret, access_ttl)?;
    let refresh_token = create_opaque_token();
    let refresh_hash = hash_token(&refresh_token);
    let pair = TokenPair::new(access_token, refresh_token, access_ttl);
    Ok((pair, refresh_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use amora_shared::middleware::decode_access_token;

    #[test]
    fn issued_access_token_validates() {
        let user_id = Uuid::new_v4();
        let (pair, refresh_hash) = create_token_pair(user_id, UserRole::Admin, "test-secret", 600).unwrap();
        let claims = decode_access_token(&pair.access_token, "test-secret").unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, UserRole::Admin);
        assert_eq!(hash_token(&pair.refresh_token), refresh_hash);
        assert_eq!(pair.token_type, "Bearer");
    }

    #[test]
    fn opaque_tokens_are_unique_hex() {
        let a = create_opaque_token();
        let b = create_opaque_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(hash_token(&a).len(), 64);
    }
}

//! Redis service for password reset codes and revoked tokens

use redis::{aio::MultiplexedConnection, AsyncCommands, Client, Script};

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct RedisService {
    client: Client,
}

/// Delete KEYS[1] only when it holds ARGV[1]
const CONSUME_IF_EQUAL: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

fn reset_key(email: &str) -> String {
    format!("reset:email:{}", email.to_lowercase())
}

fn revoked_key(jti: &str) -> String {
    format!("revoked:jti:{}", jti)
}

impl RedisService {
    /// Create a new Redis service
    pub async fn new(url: &str) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        let service = Self { client };
        service.ping().await?;
        Ok(service)
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get Redis connection: {}", e)))
    }

    pub async fn ping(&self) -> AppResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection test failed: {}", e)))?;
        Ok(())
    }

    /// Store a password reset code, replacing any previous one
    pub async fn store_reset_code(&self, email: &str, code: &str, ttl_secs: u64) -> AppResult<()> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(reset_key(email), code, ttl_secs)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store reset code in Redis: {}", e)))?;
        Ok(())
    }

    /// Check a reset code without consuming it
    pub async fn check_reset_code(&self, email: &str, code: &str) -> AppResult<bool> {
        let mut conn = self.connection().await?;
        let stored: Option<String> = conn
            .get(reset_key(email))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get reset code from Redis: {}", e)))?;
        Ok(stored.as_deref() == Some(code))
    }

    /// Verify and consume a reset code (one-time use).
    /// Compare and delete run as one script so a code is accepted once.
    pub async fn consume_reset_code(&self, email: &str, code: &str) -> AppResult<bool> {
        let mut conn = self.connection().await?;
        let deleted: i64 = Script::new(CONSUME_IF_EQUAL)
            .key(reset_key(email))
            .arg(code)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to consume reset code in Redis: {}", e)))?;
        Ok(deleted == 1)
    }

    /// Remember a logged-out token id until the token would have expired
    pub async fn revoke_token(&self, jti: &str, ttl_secs: u64) -> AppResult<()> {
        if ttl_secs == 0 {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(revoked_key(jti), "1", ttl_secs)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to revoke token in Redis: {}", e)))?;
        Ok(())
    }

    pub async fn is_token_revoked(&self, jti: &str) -> AppResult<bool> {
        let mut conn = self.connection().await?;
        let exists: bool = conn
            .exists(revoked_key(jti))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to check token in Redis: {}", e)))?;
        Ok(exists)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_key_is_case_insensitive() {
        assert_eq!(reset_key("Reader@Example.com"), reset_key("reader@example.com"));
    }

    #[test]
    fn test_keys_are_namespaced() {
        assert!(reset_key("a@b.c").starts_with("reset:"));
        assert!(revoked_key("abc").starts_with("revoked:"));
    }

    #[tokio::test]
    #[ignore] // needs a Redis server at REDIS_URL
    async fn test_reset_code_is_consumed_once() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let redis = RedisService::new(&url).await.unwrap();
        let email = format!("reset-{}@example.com", uuid::Uuid::new_v4().simple());
        redis.store_reset_code(&email, "123456", 60).await.unwrap();

        assert!(!redis.consume_reset_code(&email, "654321").await.unwrap());

        let (first, second) = tokio::join!(
            redis.consume_reset_code(&email, "123456"),
            redis.consume_reset_code(&email, "123456"),
        );
        assert!(first.unwrap() ^ second.unwrap());
        assert!(!redis.check_reset_code(&email, "123456").await.unwrap());
    }
}

//! Authentication service for registration, login and token management

use base64::{engine::general_purpose::STANDARD, Engine};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared::Role;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{check_field, AppError, AppResult};
use crate::middleware::AuthUser;
use crate::services::users::UserProfile;

const ACCESS: &str = "access";
const REFRESH: &str = "refresh";

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    db: PgPool,
    jwt_secret: String,
    refresh_secret: String,
    access_token_expiry: i64,
    refresh_token_expiry: i64,
    instance_id: Uuid,
}

/// Input for registering a user account
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(length(min = 3, max = 100))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // User ID
    pub role: String,
    pub instance_id: String,
    #[serde(rename = "type")]
    pub token_type: String,
    pub exp: i64,
    pub iat: i64,
}

/// Authentication tokens
#[derive(Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct CredentialRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    is_active: bool,
}

impl AuthService {
    pub fn new(db: PgPool, config: &Config, instance_id: Uuid) -> Self {
        Self {
            db,
            jwt_secret: config.jwt.secret.clone(),
            refresh_secret: config.jwt.refresh_secret.clone(),
            access_token_expiry: config.jwt.access_token_expiry,
            refresh_token_expiry: config.jwt.refresh_token_expiry,
            instance_id,
        }
    }

    /// Register a new user account
    pub async fn register(&self, input: RegisterInput) -> AppResult<UserProfile> {
        input.validate()?;
        check_field("password", shared::validate_password(&input.password))?;

        let password_hash = hash(&input.password, DEFAULT_COST)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;
        let role = input.role.unwrap_or(Role::User);

        let user = sqlx::query_as::<_, UserProfile>(
            r#"
            INSERT INTO users (username, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, email, role, is_active, serial_number_prefix,
                      serial_number_counter, last_login_at, created_at, updated_at
            "#,
        )
        .bind(input.username.trim())
        .bind(input.email.trim().to_lowercase())
        .bind(&password_hash)
        .bind(role.as_str())
        .fetch_one(&self.db)
        .await?;

        tracing::info!(user_id = %user.id, role = %role, "User registered");
        Ok(user)
    }

    /// Authenticate user with email and password
    pub async fn login(&self, input: LoginInput) -> AppResult<AuthTokens> {
        let user = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT id, username, email, password_hash, role, is_active
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(input.email.trim().to_lowercase())
        .fetch_optional(&self.db)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

        let valid = verify(&input.password, &user.password_hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))?;
        if !valid {
            tracing::warn!(email = %user.email, "Failed login attempt");
            return Err(AppError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(AppError::AccountDisabled);
        }

        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(&self.db)
            .await?;

        let tokens = self.generate_tokens(user.id, &user.role)?;
        self.store_refresh_token(user.id, &tokens.refresh_token).await?;

        tracing::info!(user = %user.username, "User logged in");
        Ok(tokens)
    }

    /// Exchange a refresh token for a new token pair. The old token is revoked.
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthTokens> {
        let claims = self.decode_claims(refresh_token, &self.refresh_secret, REFRESH)?;
        let user_id = parse_subject(&claims)?;
        let token_hash = Self::hash_token(refresh_token);

        let mut tx = self.db.begin().await?;

        let revoked = sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked_at = NOW()
            WHERE token_hash = $1 AND user_id = $2
              AND revoked_at IS NULL AND expires_at > NOW()
            "#,
        )
        .bind(&token_hash)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() == 0 {
            return Err(AppError::InvalidToken);
        }

        let user = sqlx::query_as::<_, (String, bool)>(
            "SELECT role, is_active FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let role = match user {
            Some((role, true)) => role,
            _ => {
                return Err(AppError::Unauthorized {
                    message: "User not found or inactive".to_string(),
                })
            }
        };

        let tokens = self.generate_tokens(user_id, &role)?;
        let expires_at = Utc::now() + Duration::seconds(self.refresh_token_expiry);
        sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token_hash, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(Self::hash_token(&tokens.refresh_token))
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(tokens)
    }

    /// Revoke a refresh token
    pub async fn logout(&self, user_id: Uuid, refresh_token: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE refresh_tokens SET revoked_at = NOW()
            WHERE token_hash = $1 AND user_id = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(Self::hash_token(refresh_token))
        .bind(user_id)
        .execute(&self.db)
        .await?;

        tracing::info!(%user_id, "Refresh token revoked");
        Ok(())
    }

    /// Validate an access token and load the user it names
    pub async fn authenticate(&self, access_token: &str) -> AppResult<AuthUser> {
        let claims = self.decode_claims(access_token, &self.jwt_secret, ACCESS)?;
        let user_id = parse_subject(&claims)?;

        let (username, email, role, is_active) = sqlx::query_as::<_, (String, String, String, bool)>(
            "SELECT username, email, role, is_active FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized {
            message: "User not found".to_string(),
        })?;

        if !is_active {
            return Err(AppError::AccountDisabled);
        }

        let role = role.parse::<Role>().map_err(|e| AppError::Unauthorized {
            message: e.to_string(),
        })?;

        Ok(AuthUser {
            user_id,
            username,
            email,
            role,
        })
    }

    fn decode_claims(&self, token: &str, secret: &str, expected_type: &str) -> AppResult<Claims> {
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::InvalidToken,
        })?
        .claims;

        if claims.token_type != expected_type {
            return Err(AppError::InvalidToken);
        }
        if claims.instance_id != self.instance_id.to_string() {
            return Err(AppError::Unauthorized {
                message: "Session expired due to server restart".to_string(),
            });
        }
        Ok(claims)
    }

    fn generate_tokens(&self, user_id: Uuid, role: &str) -> AppResult<AuthTokens> {
        let access_token = self.sign(user_id, role, ACCESS, self.access_token_expiry, &self.jwt_secret)?;
        let refresh_token = self.sign(
            user_id,
            role,
            REFRESH,
            self.refresh_token_expiry,
            &self.refresh_secret,
        )?;

        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: self.access_token_expiry,
        })
    }

    fn sign(
        &self,
        user_id: Uuid,
        role: &str,
        token_type: &str,
        lifetime: i64,
        secret: &str,
    ) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            role: role.to_string(),
            instance_id: self.instance_id.to_string(),
            token_type: token_type.to_string(),
            exp: (now + Duration::seconds(lifetime)).timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    async fn store_refresh_token(&self, user_id: Uuid, token: &str) -> AppResult<()> {
        let expires_at = Utc::now() + Duration::seconds(self.refresh_token_expiry);

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(user_id)
        .bind(Self::hash_token(token))
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// SHA-256 of the token, base64 encoded
    fn hash_token(token: &str) -> String {
        STANDARD.encode(Sha256::digest(token.as_bytes()))
    }
}

fn parse_subject(claims: &Claims) -> AppResult<Uuid> {
    Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CorsConfig, DatabaseConfig, JwtConfig, ServerConfig};

    fn service(instance_id: Uuid) -> AuthService {
        let config = Config {
            environment: "test".to_string(),
            server: ServerConfig {
                port: 8000,
                host: "127.0.0.1".to_string(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/doorworks_test".to_string(),
                max_connections: 1,
                min_connections: 0,
            },
            jwt: JwtConfig {
                secret: "access-secret".to_string(),
                refresh_secret: "refresh-secret".to_string(),
                access_token_expiry: 1800,
                refresh_token_expiry: 604800,
            },
            cors: CorsConfig::default(),
        };
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database.url)
            .unwrap();
        AuthService::new(pool, &config, instance_id)
    }

    #[tokio::test]
    async fn test_token_pair_claims() {
        let svc = service(Uuid::new_v4());
        let user_id = Uuid::new_v4();
        let tokens = svc.generate_tokens(user_id, "billing_executive").unwrap();

        assert_eq!(tokens.token_type, "bearer");
        assert_eq!(tokens.expires_in, 1800);

        let access = svc.decode_claims(&tokens.access_token, "access-secret", ACCESS).unwrap();
        assert_eq!(access.sub, user_id.to_string());
        assert_eq!(access.role, "billing_executive");

        let refresh = svc
            .decode_claims(&tokens.refresh_token, "refresh-secret", REFRESH)
            .unwrap();
        assert_eq!(refresh.token_type, "refresh");
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let svc = service(Uuid::new_v4());
        let tokens = svc.generate_tokens(Uuid::new_v4(), "admin").unwrap();

        // Signed with the refresh secret, so the access key rejects it
        assert!(matches!(
            svc.decode_claims(&tokens.refresh_token, "access-secret", ACCESS),
            Err(AppError::InvalidToken)
        ));
        // Right key, wrong type
        assert!(matches!(
            svc.decode_claims(&tokens.refresh_token, "refresh-secret", ACCESS),
            Err(AppError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_tokens_die_with_the_instance() {
        let before_restart = service(Uuid::new_v4());
        let after_restart = service(Uuid::new_v4());
        let tokens = before_restart.generate_tokens(Uuid::new_v4(), "admin").unwrap();

        assert!(matches!(
            after_restart.decode_claims(&tokens.access_token, "access-secret", ACCESS),
            Err(AppError::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_token_hash_is_stable() {
        let a = AuthService::hash_token("token");
        assert_eq!(a, AuthService::hash_token("token"));
        assert_ne!(a, AuthService::hash_token("other"));
        assert_eq!(a.len(), 44);
    }
}

//! 认证和授权模块
//!
//! 提供JWT令牌和密码哈希服务

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::{PlatformError, Result};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub name: String,
    pub email: String,
    /// "individual" | "institution"
    pub account_type: String,
    pub institution_name: Option<String>,
    pub exp: usize,
}

/// 登录成功后签发给 UI 协作方持有的账户摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub id: String,
    pub name: String,
    pub email: String,
    pub account_type: String,
    pub institution_name: Option<String>,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        let secret = secret.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
        }
    }

    pub fn generate_token(&self, account: &AccountInfo) -> Result<String> {
        let expiration = (chrono::Utc::now().timestamp() + 3600 * 24 * 7) as usize; // 7天过期

        let claims = Claims {
            id: account.id.clone(),
            name: account.name.clone(),
            email: account.email.clone(),
            account_type: account.account_type.clone(),
            institution_name: account.institution_name.clone(),
            exp: expiration,
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| PlatformError::Unauthorized(format!("Failed to generate token: {}", e)))
    }

    pub fn validate_token(&self, token: &str) -> Result<AccountInfo> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| PlatformError::Unauthorized(format!("Invalid token: {}", e)))?;
        let claims = token_data.claims;

        Ok(AccountInfo {
            id: claims.id,
            name: claims.name,
            email: claims.email,
            account_type: claims.account_type,
            institution_name: claims.institution_name,
        })
    }
}

pub struct PasswordService;

impl PasswordService {
    pub fn hash_password(password: &str) -> Result<String> {
        bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| PlatformError::Storage(format!("Failed to hash password: {}", e)))
    }

    pub fn verify_password(hash: &str, password: &str) -> Result<bool> {
        bcrypt::verify(password, hash)
            .map_err(|e| PlatformError::Storage(format!("Failed to verify password: {}", e)))
    }
}

//! 应用配置
//!
//! 环境变量驱动（配合 .env），服务没有 CLI 面

use crate::errors::{PlatformError, Result};

/// 开发环境默认密钥，生产部署必须通过 JWT_SECRET 覆盖
pub const DEV_JWT_SECRET: &str = "default_secret_key_for_dev";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Web 服务监听地址
    pub web_bind: String,
    /// SQLite 数据库文件路径
    pub db_path: String,
    /// JWT 签名密钥
    pub jwt_secret: String,
    /// 签发时是否通过身份目录校验归属方存在
    pub validate_owners: bool,
}

impl AppConfig {
    /// 从环境变量读取配置
    ///
    /// # 环境变量
    /// - `WEB_BIND`: 监听地址（默认 `0.0.0.0:8000`）
    /// - `DB_PATH`: 数据库路径（默认 `./data/playpass.db`）
    /// - `JWT_SECRET`: JWT 密钥
    /// - `VALIDATE_OWNERS`: 签发时校验归属方（默认 false，id 保持不透明）
    pub fn from_env() -> Self {
        Self {
            web_bind: env_or("WEB_BIND", "0.0.0.0:8000"),
            db_path: env_or("DB_PATH", "./data/playpass.db"),
            jwt_secret: env_or("JWT_SECRET", DEV_JWT_SECRET),
            validate_owners: parse_bool(&env_or("VALIDATE_OWNERS", "false")),
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        self.web_bind
            .parse::<std::net::SocketAddr>()
            .map_err(|e| PlatformError::Config(format!("invalid WEB_BIND '{}': {}", self.web_bind, e)))?;

        if self.db_path.trim().is_empty() {
            return Err(PlatformError::Config("DB_PATH must not be empty".to_string()));
        }

        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

//! 游玩凭证平台后端
//!
//! 追踪个人用户与机构学生的游玩消费，凭一次性、限时的“游玩凭证”
//! 在线下游戏终端核销：
//! - 凭证签发（绑定付费方与游玩次数，token 为唯一核销凭据）
//! - 凭证核销（同一 token 并发核销时每次游玩至多一个赢家）
//! - 凭证查询（终端与客户端轮询余额）
//! - 注册 / 登录（个人与机构两类账户）
//!
//! # 架构分层
//!
//! - `domain`: 领域模型（凭证、归属方身份）
//! - `core`: 核心层，存储抽象与签发/核销状态机
//! - `infrastructure`: 基础设施层，SQLite 存储、HTTP 服务、认证

// 领域层
pub mod domain;

// 核心层
pub mod core;

// 基础设施层
pub mod infrastructure;

// 顶层模块
pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod logger;

// 重新导出核心类型
pub use crate::core::issuer::{NewVoucher, VoucherIssuer};
pub use crate::core::redeemer::{RedemptionReceipt, VoucherRedeemer};
pub use crate::core::store::{MemoryStore, RedeemOutcome, Store};
pub use crate::domain::{OwnerType, Voucher, VoucherStatus};
pub use crate::errors::{PlatformError, Result};

// 重新导出基础设施类型
pub use crate::infrastructure::store::SqliteStore;
pub use crate::infrastructure::web::{create_router, start_web_server, AppState};

/// 框架版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

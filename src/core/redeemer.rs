//! 凭证核销
//!
//! 核心状态机：active → {active, exhausted, expired}，revoked 为吸收态。
//! 原子性由存储层的 `try_redeem` 保证，本模块负责结果分类、撤销入口和日志。
//! 核销失败对本次调用是终态，绝不自动重试（避免意外双重消耗）。

use std::sync::Arc;

use tracing::{info, warn};

use crate::core::store::{RedeemOutcome, Store};
use crate::domain::Voucher;
use crate::errors::{PlatformError, Result};

/// 一次成功核销的回执
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionReceipt {
    /// 本次核销后剩余的游玩次数
    pub remaining_plays: u32,
    /// 是否为请求ID重放（未发生新消耗）
    pub replayed: bool,
}

/// 凭证核销服务
pub struct VoucherRedeemer {
    store: Arc<dyn Store>,
}

impl VoucherRedeemer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// 核销一次游玩
    ///
    /// 终端可携带自生成的 `request_id`，网络超时后原样重发即可安全重试：
    /// 已成功过的请求按重放处理，不再消耗次数。
    pub async fn redeem(&self, token: &str, request_id: Option<&str>) -> Result<RedemptionReceipt> {
        let now = chrono::Utc::now().timestamp();

        match self.store.try_redeem(token, request_id, now).await? {
            RedeemOutcome::Redeemed {
                remaining_plays,
                replayed,
            } => {
                info!(token = %token, remaining_plays, replayed, "voucher redeemed");
                Ok(RedemptionReceipt {
                    remaining_plays,
                    replayed,
                })
            }
            RedeemOutcome::NotFound => {
                warn!(token = %token, "redeem rejected: unknown token");
                Err(PlatformError::NotFound)
            }
            RedeemOutcome::Revoked => {
                warn!(token = %token, "redeem rejected: voucher revoked");
                Err(PlatformError::Revoked)
            }
            RedeemOutcome::Expired => {
                warn!(token = %token, "redeem rejected: voucher expired");
                Err(PlatformError::Expired)
            }
            RedeemOutcome::Exhausted => {
                warn!(token = %token, "redeem rejected: no plays remaining");
                Err(PlatformError::Exhausted)
            }
        }
    }

    /// 撤销凭证（带外管理操作，吸收态）
    pub async fn revoke(&self, token: &str) -> Result<Voucher> {
        match self.store.revoke_voucher(token).await? {
            Some(voucher) => {
                info!(token = %token, "voucher revoked");
                Ok(voucher)
            }
            None => Err(PlatformError::NotFound),
        }
    }
}

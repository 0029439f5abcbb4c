//! 凭证签发
//!
//! 校验签发请求、生成唯一 token 并落库。签发是纯创建操作，
//! 除新凭证行外不触碰任何其他实体。

use std::sync::Arc;

use tracing::{info, warn};

use crate::core::store::Store;
use crate::domain::{OwnerType, Voucher};
use crate::errors::{PlatformError, Result};

/// token 生成冲突重试上限，超过视为签发失败
const TOKEN_RETRY_LIMIT: u32 = 5;

/// 签发请求参数
///
/// `assigned_plays` 保持宽类型，正整数校验在 `issue` 内显式完成，
/// 零/负数/超界都以 `Validation` 拒绝。
#[derive(Debug, Clone)]
pub struct NewVoucher {
    pub owner_id: String,
    pub owner_type: OwnerType,
    pub institution_id: Option<String>,
    pub assigned_plays: i64,
    pub amount_paid: Option<f64>,
    pub expires_in_minutes: Option<i64>,
}

/// 凭证签发服务
pub struct VoucherIssuer {
    store: Arc<dyn Store>,
    // 为 true 时通过身份目录校验归属方存在；默认关闭，id 保持不透明
    validate_owners: bool,
}

impl VoucherIssuer {
    pub fn new(store: Arc<dyn Store>, validate_owners: bool) -> Self {
        Self {
            store,
            validate_owners,
        }
    }

    /// 签发一张新凭证
    ///
    /// token 冲突时换新 token 重试，重试耗尽返回瞬时错误；
    /// 校验失败时不产生任何落库副作用。
    pub async fn issue(&self, req: NewVoucher) -> Result<Voucher> {
        Self::validate(&req)?;

        if self.validate_owners
            && !self
                .store
                .owner_exists(&req.owner_id, req.owner_type)
                .await?
        {
            return Err(PlatformError::Validation(format!(
                "unknown {} owner: {}",
                req.owner_type, req.owner_id
            )));
        }

        let assigned_plays = req.assigned_plays as u32;
        let amount_paid = req.amount_paid.unwrap_or(0.0);

        for attempt in 1..=TOKEN_RETRY_LIMIT {
            let voucher = Voucher::new(
                req.owner_id.clone(),
                req.owner_type,
                req.institution_id.clone(),
                assigned_plays,
                amount_paid,
                req.expires_in_minutes,
            );

            match self.store.insert_voucher(&voucher).await {
                Ok(()) => {
                    info!(
                        token = %voucher.token,
                        owner = %voucher.owner_id,
                        plays = voucher.assigned_plays,
                        "voucher issued"
                    );
                    return Ok(voucher);
                }
                Err(PlatformError::Conflict(_)) => {
                    // 128位随机值撞上已有 token，换一个再试
                    warn!(attempt, "voucher token collision, regenerating");
                }
                Err(e) => return Err(e),
            }
        }

        Err(PlatformError::TransientStore(format!(
            "token generation collided {} times",
            TOKEN_RETRY_LIMIT
        )))
    }

    fn validate(req: &NewVoucher) -> Result<()> {
        if req.owner_id.trim().is_empty() {
            return Err(PlatformError::Validation("userId is required".to_string()));
        }

        if req.owner_type == OwnerType::Student
            && req
                .institution_id
                .as_deref()
                .map_or(true, |id| id.trim().is_empty())
        {
            return Err(PlatformError::Validation(
                "institutionId is required for student vouchers".to_string(),
            ));
        }

        if req.assigned_plays <= 0 || req.assigned_plays > i64::from(u32::MAX) {
            return Err(PlatformError::Validation(
                "assignedPlays must be a positive integer".to_string(),
            ));
        }

        if req.amount_paid.is_some_and(|a| a < 0.0) {
            return Err(PlatformError::Validation(
                "amountPaid must not be negative".to_string(),
            ));
        }

        if req.expires_in_minutes.is_some_and(|m| m < 0) {
            return Err(PlatformError::Validation(
                "expiresInMinutes must not be negative".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::MemoryStore;

    fn issuer() -> VoucherIssuer {
        VoucherIssuer::new(Arc::new(MemoryStore::new()), false)
    }

    fn request() -> NewVoucher {
        NewVoucher {
            owner_id: "user-1".to_string(),
            owner_type: OwnerType::Individual,
            institution_id: None,
            assigned_plays: 3,
            amount_paid: Some(150.0),
            expires_in_minutes: Some(60),
        }
    }

    #[tokio::test]
    async fn test_issue_defaults() {
        let voucher = issuer().issue(request()).await.unwrap();
        assert_eq!(voucher.assigned_plays, 3);
        assert_eq!(voucher.used_plays, 0);
        assert_eq!(voucher.token.len(), 32);
    }

    #[tokio::test]
    async fn test_amount_defaults_to_zero() {
        let voucher = issuer()
            .issue(NewVoucher {
                amount_paid: None,
                ..request()
            })
            .await
            .unwrap();
        assert_eq!(voucher.amount_paid, 0.0);
    }

    #[tokio::test]
    async fn test_zero_plays_rejected() {
        let err = issuer()
            .issue(NewVoucher {
                assigned_plays: 0,
                ..request()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Validation(_)));
    }

    #[tokio::test]
    async fn test_student_requires_institution() {
        let err = issuer()
            .issue(NewVoucher {
                owner_type: OwnerType::Student,
                institution_id: None,
                ..request()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::Validation(_)));
    }
}

//! 内存存储实现
//!
//! 默认的存储实现，数据仅在内存中，重启后丢失。
//! 核销通过写锁临界区串行化，与SQLite实现提供相同的原子性保证。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{IndividualUser, Institution, OwnerType, Student, Voucher, VoucherStatus};
use crate::errors::{PlatformError, Result};

use super::{RedeemOutcome, Store};

/// 内存存储
///
/// 使用内存数据结构存储所有数据，适合测试和无需持久化的场景
pub struct MemoryStore {
    vouchers: RwLock<HashMap<String, Voucher>>,
    // (token, request_id) -> 核销时返回的剩余次数
    redemptions: RwLock<HashMap<(String, String), u32>>,
    individuals: RwLock<HashMap<String, IndividualUser>>,
    institutions: RwLock<HashMap<String, Institution>>,
    students: RwLock<HashMap<String, Student>>,
}

impl MemoryStore {
    /// 创建新的内存存储
    pub fn new() -> Self {
        Self {
            vouchers: RwLock::new(HashMap::new()),
            redemptions: RwLock::new(HashMap::new()),
            individuals: RwLock::new(HashMap::new()),
            institutions: RwLock::new(HashMap::new()),
            students: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_voucher(&self, voucher: &Voucher) -> Result<()> {
        let mut vouchers = self.vouchers.write().await;
        if vouchers.contains_key(&voucher.token) {
            return Err(PlatformError::Conflict(format!(
                "voucher token already exists: {}",
                voucher.token
            )));
        }
        vouchers.insert(voucher.token.clone(), voucher.clone());
        Ok(())
    }

    async fn get_voucher(&self, token: &str) -> Result<Option<Voucher>> {
        let vouchers = self.vouchers.read().await;
        Ok(vouchers.get(token).cloned())
    }

    async fn try_redeem(
        &self,
        token: &str,
        request_id: Option<&str>,
        now: i64,
    ) -> Result<RedeemOutcome> {
        // 写锁覆盖读取、校验与自增，等价于单写者事务
        let mut vouchers = self.vouchers.write().await;
        let mut redemptions = self.redemptions.write().await;

        let voucher = match vouchers.get_mut(token) {
            Some(v) => v,
            None => return Ok(RedeemOutcome::NotFound),
        };

        if voucher.status == VoucherStatus::Revoked {
            return Ok(RedeemOutcome::Revoked);
        }

        if let Some(rid) = request_id {
            if let Some(&remaining) = redemptions.get(&(token.to_string(), rid.to_string())) {
                return Ok(RedeemOutcome::Redeemed {
                    remaining_plays: remaining,
                    replayed: true,
                });
            }
        }

        if voucher.is_expired(now) {
            if voucher.status == VoucherStatus::Active {
                voucher.status = VoucherStatus::Expired;
            }
            return Ok(RedeemOutcome::Expired);
        }

        if voucher.used_plays >= voucher.assigned_plays {
            return Ok(RedeemOutcome::Exhausted);
        }

        voucher.used_plays += 1;
        if voucher.used_plays >= voucher.assigned_plays {
            voucher.status = VoucherStatus::Exhausted;
        }
        let remaining = voucher.remaining_plays();

        if let Some(rid) = request_id {
            redemptions.insert((token.to_string(), rid.to_string()), remaining);
        }

        Ok(RedeemOutcome::Redeemed {
            remaining_plays: remaining,
            replayed: false,
        })
    }

    async fn revoke_voucher(&self, token: &str) -> Result<Option<Voucher>> {
        let mut vouchers = self.vouchers.write().await;
        match vouchers.get_mut(token) {
            Some(voucher) => {
                voucher.status = VoucherStatus::Revoked;
                Ok(Some(voucher.clone()))
            }
            None => Ok(None),
        }
    }

    async fn insert_individual(&self, user: &IndividualUser) -> Result<()> {
        let mut individuals = self.individuals.write().await;
        if individuals.values().any(|u| u.email == user.email) {
            return Err(PlatformError::Conflict(format!(
                "email already registered: {}",
                user.email
            )));
        }
        individuals.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn find_individual_by_email(&self, email: &str) -> Result<Option<IndividualUser>> {
        let individuals = self.individuals.read().await;
        Ok(individuals.values().find(|u| u.email == email).cloned())
    }

    async fn insert_institution(&self, institution: &Institution) -> Result<()> {
        let mut institutions = self.institutions.write().await;
        if institutions.values().any(|i| i.email == institution.email) {
            return Err(PlatformError::Conflict(format!(
                "email already registered: {}",
                institution.email
            )));
        }
        institutions.insert(institution.id.clone(), institution.clone());
        Ok(())
    }

    async fn find_institution_by_email(&self, email: &str) -> Result<Option<Institution>> {
        let institutions = self.institutions.read().await;
        Ok(institutions.values().find(|i| i.email == email).cloned())
    }

    async fn insert_student(&self, student: &Student) -> Result<()> {
        let mut students = self.students.write().await;
        students.insert(student.id.clone(), student.clone());
        Ok(())
    }

    async fn find_student(&self, student_id: &str) -> Result<Option<Student>> {
        let students = self.students.read().await;
        Ok(students.get(student_id).cloned())
    }

    async fn owner_exists(&self, owner_id: &str, owner_type: OwnerType) -> Result<bool> {
        match owner_type {
            OwnerType::Individual => {
                let individuals = self.individuals.read().await;
                Ok(individuals.contains_key(owner_id))
            }
            OwnerType::Student => {
                let students = self.students.read().await;
                Ok(students.contains_key(owner_id))
            }
        }
    }
}

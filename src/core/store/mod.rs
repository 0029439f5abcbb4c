//! 存储接口定义
//!
//! 提供持久化能力的抽象接口，支持内存和SQLite实现。
//! 凭证核销是唯一需要并发控制的操作：`try_redeem` 必须对同一 token 的
//! 并发调用原子执行，保证 `used_plays` 永不超过 `assigned_plays`。

pub mod memory;

use async_trait::async_trait;

use crate::domain::{IndividualUser, Institution, OwnerType, Student, Voucher};
use crate::errors::Result;

pub use memory::MemoryStore;

/// 单次核销的结果分类
///
/// 分类在存储事务内完成，对外是一次原子状态迁移的完整结论。
#[derive(Debug, Clone, PartialEq)]
pub enum RedeemOutcome {
    /// 成功消耗一次游玩（replayed 表示命中请求ID重放，没有新消耗）
    Redeemed { remaining_plays: u32, replayed: bool },
    /// token 不存在
    NotFound,
    /// 凭证已被撤销
    Revoked,
    /// 凭证已过期
    Expired,
    /// 游玩次数已用完（包括并发竞争中落败的一方）
    Exhausted,
}

/// 存储接口
///
/// 提供凭证生命周期与用户/机构身份的持久化能力。
/// 凭证核心逻辑只依赖本抽象，不依赖具体驱动。
#[async_trait]
pub trait Store: Send + Sync {
    // ==================== 凭证 ====================

    /// 插入新凭证
    ///
    /// token 冲突必须返回 `Conflict` 错误，绝不允许覆盖已有凭证
    async fn insert_voucher(&self, voucher: &Voucher) -> Result<()>;

    /// 按 token 查询凭证（读已提交即可，无需加锁）
    async fn get_voucher(&self, token: &str) -> Result<Option<Voucher>>;

    /// 尝试核销一次游玩
    ///
    /// 对同一 token 的并发调用必须串行化：读取、校验、自增必须在同一个
    /// 事务/临界区内完成，要么全部生效要么全部回滚。
    /// `request_id` 若已被记录过则按重放处理，返回当时的剩余次数且不再消耗。
    async fn try_redeem(
        &self,
        token: &str,
        request_id: Option<&str>,
        now: i64,
    ) -> Result<RedeemOutcome>;

    /// 撤销凭证（吸收态，带外管理操作）
    ///
    /// 返回撤销后的凭证；token 不存在时返回 None
    async fn revoke_voucher(&self, token: &str) -> Result<Option<Voucher>>;

    // ==================== 身份 ====================

    /// 保存个人用户（邮箱唯一，冲突返回 `Conflict`）
    async fn insert_individual(&self, user: &IndividualUser) -> Result<()>;

    /// 按邮箱查询个人用户
    async fn find_individual_by_email(&self, email: &str) -> Result<Option<IndividualUser>>;

    /// 保存机构（邮箱唯一，冲突返回 `Conflict`）
    async fn insert_institution(&self, institution: &Institution) -> Result<()>;

    /// 按邮箱查询机构
    async fn find_institution_by_email(&self, email: &str) -> Result<Option<Institution>>;

    /// 保存学生记录
    async fn insert_student(&self, student: &Student) -> Result<()>;

    /// 按ID查询学生
    async fn find_student(&self, student_id: &str) -> Result<Option<Student>>;

    /// 判断凭证归属方是否存在（签发方可选的身份校验）
    async fn owner_exists(&self, owner_id: &str, owner_type: OwnerType) -> Result<bool>;
}

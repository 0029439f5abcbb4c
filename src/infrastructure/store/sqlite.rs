//! SQLite 存储实现
//!
//! 使用 SQLite 作为后端，平台唯一的持久化真相来源，也是唯一的锁域。
//! 核销在 IMMEDIATE 事务内完成“读取-校验-条件自增”，配合
//! `used_plays < assigned_plays` 的条件更新保证同一 token 的并发核销
//! 至多一方赢得最后一次游玩。

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, TransactionBehavior};

use crate::core::store::{RedeemOutcome, Store};
use crate::domain::{IndividualUser, Institution, OwnerType, Student, Voucher, VoucherStatus};
use crate::errors::{PlatformError, Result};

/// 锁等待上限，超时以瞬时错误回报调用方
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite 存储
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// 创建新的 SQLite 存储
    ///
    /// 如果数据库文件不存在，会自动创建
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::with_connection(Connection::open(db_path)?)
    }

    /// 创建内存数据库（用于测试）
    pub fn new_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// 初始化数据库表结构
    fn init_schema(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| PlatformError::Storage(format!("Failed to acquire database lock: {}", e)))?;

        conn.execute_batch(
            "
            -- 个人用户表
            CREATE TABLE IF NOT EXISTS individual_users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            -- 机构表
            CREATE TABLE IF NOT EXISTS institutions (
                id TEXT PRIMARY KEY,
                admin_name TEXT NOT NULL,
                institution_name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );

            -- 学生表
            CREATE TABLE IF NOT EXISTS students (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                standard TEXT NOT NULL,
                division TEXT NOT NULL,
                roll_number TEXT NOT NULL,
                institution_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (institution_id) REFERENCES institutions(id)
            );

            -- 凭证表
            CREATE TABLE IF NOT EXISTS vouchers (
                id TEXT PRIMARY KEY,
                token TEXT UNIQUE NOT NULL,
                owner_id TEXT NOT NULL,
                owner_type TEXT NOT NULL,
                institution_id TEXT,
                assigned_plays INTEGER NOT NULL,
                used_plays INTEGER NOT NULL DEFAULT 0,
                amount_paid REAL NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'active',
                created_at INTEGER NOT NULL,
                expires_at INTEGER,
                CHECK (used_plays >= 0 AND used_plays <= assigned_plays)
            );

            -- 核销记录表（请求ID重放去重）
            CREATE TABLE IF NOT EXISTS voucher_redemptions (
                voucher_id TEXT NOT NULL,
                request_id TEXT NOT NULL,
                remaining_plays INTEGER NOT NULL,
                redeemed_at INTEGER NOT NULL,
                PRIMARY KEY (voucher_id, request_id),
                FOREIGN KEY (voucher_id) REFERENCES vouchers(id)
            );

            -- 创建索引
            CREATE INDEX IF NOT EXISTS idx_vouchers_owner ON vouchers(owner_id, owner_type);
            CREATE INDEX IF NOT EXISTS idx_students_institution ON students(institution_id);

            PRAGMA foreign_keys = ON;
            ",
        )?;

        Ok(())
    }

    /// 在阻塞线程池中执行数据库操作
    async fn execute<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                PlatformError::Storage(format!("Failed to acquire database lock: {}", e))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| PlatformError::Storage(format!("Task failed: {}", e)))?
    }
}

const VOUCHER_COLUMNS: &str = "id, token, owner_id, owner_type, institution_id, \
     assigned_plays, used_plays, amount_paid, status, created_at, expires_at";

fn row_to_voucher(row: &rusqlite::Row<'_>) -> rusqlite::Result<Voucher> {
    let owner_type: String = row.get(3)?;
    let status: String = row.get(8)?;

    Ok(Voucher {
        id: row.get(0)?,
        token: row.get(1)?,
        owner_id: row.get(2)?,
        owner_type: owner_type.parse::<OwnerType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
        })?,
        institution_id: row.get(4)?,
        assigned_plays: row.get(5)?,
        used_plays: row.get(6)?,
        amount_paid: row.get(7)?,
        status: status.parse::<VoucherStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, e.into())
        })?,
        created_at: row.get(9)?,
        expires_at: row.get(10)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_voucher(&self, voucher: &Voucher) -> Result<()> {
        let voucher = voucher.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO vouchers (
                    id, token, owner_id, owner_type, institution_id,
                    assigned_plays, used_plays, amount_paid, status, created_at, expires_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    &voucher.id,
                    &voucher.token,
                    &voucher.owner_id,
                    voucher.owner_type.to_string(),
                    voucher.institution_id.as_deref(),
                    voucher.assigned_plays,
                    voucher.used_plays,
                    voucher.amount_paid,
                    voucher.status.to_string(),
                    voucher.created_at,
                    voucher.expires_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_voucher(&self, token: &str) -> Result<Option<Voucher>> {
        let token = token.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM vouchers WHERE token = ?1",
                VOUCHER_COLUMNS
            ))?;

            match stmt.query_row([&token], row_to_voucher) {
                Ok(voucher) => Ok(Some(voucher)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn try_redeem(
        &self,
        token: &str,
        request_id: Option<&str>,
        now: i64,
    ) -> Result<RedeemOutcome> {
        let token = token.to_string();
        let request_id = request_id.map(str::to_string);

        self.execute(move |conn| {
            // IMMEDIATE 立即取写锁，读取与条件自增之间不会插入其他写者
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let voucher = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {} FROM vouchers WHERE token = ?1",
                    VOUCHER_COLUMNS
                ))?;
                match stmt.query_row([&token], row_to_voucher) {
                    Ok(v) => v,
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        return Ok(RedeemOutcome::NotFound)
                    }
                    Err(e) => return Err(e.into()),
                }
            };

            if voucher.status == VoucherStatus::Revoked {
                return Ok(RedeemOutcome::Revoked);
            }

            // 请求ID重放：同一请求只消耗一次
            if let Some(rid) = request_id.as_deref() {
                let prior = tx.query_row(
                    "SELECT remaining_plays FROM voucher_redemptions
                     WHERE voucher_id = ?1 AND request_id = ?2",
                    params![&voucher.id, rid],
                    |row| row.get::<_, u32>(0),
                );
                match prior {
                    Ok(remaining_plays) => {
                        return Ok(RedeemOutcome::Redeemed {
                            remaining_plays,
                            replayed: true,
                        })
                    }
                    Err(rusqlite::Error::QueryReturnedNoRows) => {}
                    Err(e) => return Err(e.into()),
                }
            }

            if voucher.is_expired(now) {
                // 顺手把滞后的状态落库，失败路径不消耗次数
                tx.execute(
                    "UPDATE vouchers SET status = 'expired' WHERE id = ?1 AND status = 'active'",
                    [&voucher.id],
                )?;
                tx.commit()?;
                return Ok(RedeemOutcome::Expired);
            }

            if voucher.used_plays >= voucher.assigned_plays {
                return Ok(RedeemOutcome::Exhausted);
            }

            // 条件自增：affected = 0 说明竞争中另一方抢走了最后一次
            let changed = tx.execute(
                "UPDATE vouchers SET
                     used_plays = used_plays + 1,
                     status = CASE
                         WHEN used_plays + 1 >= assigned_plays THEN 'exhausted'
                         ELSE status
                     END
                 WHERE id = ?1 AND used_plays < assigned_plays",
                [&voucher.id],
            )?;
            if changed == 0 {
                return Ok(RedeemOutcome::Exhausted);
            }

            let remaining_plays: u32 = tx.query_row(
                "SELECT assigned_plays - used_plays FROM vouchers WHERE id = ?1",
                [&voucher.id],
                |row| row.get(0),
            )?;

            if let Some(rid) = request_id.as_deref() {
                tx.execute(
                    "INSERT INTO voucher_redemptions (voucher_id, request_id, remaining_plays, redeemed_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![&voucher.id, rid, remaining_plays, now],
                )?;
            }

            tx.commit()?;
            Ok(RedeemOutcome::Redeemed {
                remaining_plays,
                replayed: false,
            })
        })
        .await
    }

    async fn revoke_voucher(&self, token: &str) -> Result<Option<Voucher>> {
        let token = token.to_string();
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE vouchers SET status = 'revoked' WHERE token = ?1",
                [&token],
            )?;
            if changed == 0 {
                return Ok(None);
            }

            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM vouchers WHERE token = ?1",
                VOUCHER_COLUMNS
            ))?;
            Ok(Some(stmt.query_row([&token], row_to_voucher)?))
        })
        .await
    }

    async fn insert_individual(&self, user: &IndividualUser) -> Result<()> {
        let user = user.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO individual_users (id, name, email, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    &user.id,
                    &user.name,
                    &user.email,
                    &user.password_hash,
                    user.created_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_individual_by_email(&self, email: &str) -> Result<Option<IndividualUser>> {
        let email = email.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, email, password_hash, created_at
                 FROM individual_users WHERE email = ?1",
            )?;

            let result = stmt.query_row([&email], |row| {
                Ok(IndividualUser {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    password_hash: row.get(3)?,
                    created_at: row.get(4)?,
                })
            });

            match result {
                Ok(user) => Ok(Some(user)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn insert_institution(&self, institution: &Institution) -> Result<()> {
        let institution = institution.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO institutions (id, admin_name, institution_name, email, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    &institution.id,
                    &institution.admin_name,
                    &institution.institution_name,
                    &institution.email,
                    &institution.password_hash,
                    institution.created_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_institution_by_email(&self, email: &str) -> Result<Option<Institution>> {
        let email = email.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, admin_name, institution_name, email, password_hash, created_at
                 FROM institutions WHERE email = ?1",
            )?;

            let result = stmt.query_row([&email], |row| {
                Ok(Institution {
                    id: row.get(0)?,
                    admin_name: row.get(1)?,
                    institution_name: row.get(2)?,
                    email: row.get(3)?,
                    password_hash: row.get(4)?,
                    created_at: row.get(5)?,
                })
            });

            match result {
                Ok(institution) => Ok(Some(institution)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn insert_student(&self, student: &Student) -> Result<()> {
        let student = student.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO students (id, name, email, standard, division, roll_number, institution_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    &student.id,
                    &student.name,
                    &student.email,
                    &student.standard,
                    &student.division,
                    &student.roll_number,
                    &student.institution_id,
                    student.created_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_student(&self, student_id: &str) -> Result<Option<Student>> {
        let student_id = student_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, email, standard, division, roll_number, institution_id, created_at
                 FROM students WHERE id = ?1",
            )?;

            let result = stmt.query_row([&student_id], |row| {
                Ok(Student {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                    standard: row.get(3)?,
                    division: row.get(4)?,
                    roll_number: row.get(5)?,
                    institution_id: row.get(6)?,
                    created_at: row.get(7)?,
                })
            });

            match result {
                Ok(student) => Ok(Some(student)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn owner_exists(&self, owner_id: &str, owner_type: OwnerType) -> Result<bool> {
        let owner_id = owner_id.to_string();
        self.execute(move |conn| {
            let sql = match owner_type {
                OwnerType::Individual => "SELECT 1 FROM individual_users WHERE id = ?1",
                OwnerType::Student => "SELECT 1 FROM students WHERE id = ?1",
            };

            match conn.query_row(sql, [&owner_id], |row| row.get::<_, i64>(0)) {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }
}

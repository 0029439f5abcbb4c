//! Play Voucher Models
//!
//! A voucher entitles its bearer to a fixed number of plays, expiring optionally.
//! The token is the sole redemption credential and must come from a CSPRNG.

use serde::{Deserialize, Serialize};

/// Voucher Owner Type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    /// Self-registered individual player
    Individual,
    /// Institution-managed student
    Student,
}

impl std::str::FromStr for OwnerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "individual" => Ok(OwnerType::Individual),
            "student" => Ok(OwnerType::Student),
            _ => Err(format!("Unknown owner type: {}", s)),
        }
    }
}

impl std::fmt::Display for OwnerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OwnerType::Individual => write!(f, "individual"),
            OwnerType::Student => write!(f, "student"),
        }
    }
}

/// Voucher Status
///
/// Stored explicitly, but redeemability is always re-derived so a stale
/// `Active` row can never redeem past its plays or expiry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VoucherStatus {
    Active,
    Expired,
    Exhausted,
    Revoked,
}

impl std::str::FromStr for VoucherStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(VoucherStatus::Active),
            "expired" => Ok(VoucherStatus::Expired),
            "exhausted" => Ok(VoucherStatus::Exhausted),
            "revoked" => Ok(VoucherStatus::Revoked),
            _ => Err(format!("Unknown voucher status: {}", s)),
        }
    }
}

impl std::fmt::Display for VoucherStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoucherStatus::Active => write!(f, "active"),
            VoucherStatus::Expired => write!(f, "expired"),
            VoucherStatus::Exhausted => write!(f, "exhausted"),
            VoucherStatus::Revoked => write!(f, "revoked"),
        }
    }
}

/// Voucher Model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    pub id: String,
    pub token: String,
    pub owner_id: String,
    pub owner_type: OwnerType,
    pub institution_id: Option<String>,
    pub assigned_plays: u32,
    pub used_plays: u32,
    pub amount_paid: f64,
    pub status: VoucherStatus,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

impl Voucher {
    /// Create a freshly issued voucher with a new random token
    pub fn new(
        owner_id: String,
        owner_type: OwnerType,
        institution_id: Option<String>,
        assigned_plays: u32,
        amount_paid: f64,
        expires_in_minutes: Option<i64>,
    ) -> Self {
        let created_at = chrono::Utc::now().timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            token: Self::generate_token(),
            owner_id,
            owner_type,
            institution_id,
            assigned_plays,
            used_plays: 0,
            amount_paid,
            status: VoucherStatus::Active,
            created_at,
            expires_at: expires_in_minutes.map(|m| created_at + m * 60),
        }
    }

    /// Generate a 128-bit random token, hex encoded (32 chars)
    ///
    /// `thread_rng` is a CSPRNG, so tokens are unguessable. Uniqueness is
    /// still enforced by the store; collisions retry at issuance.
    pub fn generate_token() -> String {
        use rand::Rng;
        let bytes: [u8; 16] = rand::thread_rng().gen();
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Plays left on the voucher
    pub fn remaining_plays(&self) -> u32 {
        self.assigned_plays.saturating_sub(self.used_plays)
    }

    /// Whether the voucher is past its expiry at `now` (unix seconds)
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }

    /// Whether a redemption at `now` may consume a play
    pub fn is_redeemable(&self, now: i64) -> bool {
        self.status != VoucherStatus::Revoked
            && !self.is_expired(now)
            && self.used_plays < self.assigned_plays
    }

    /// Status derived from the current counters and clock
    ///
    /// The stored status may lag (expiry is only persisted opportunistically);
    /// readers surface this derived value.
    pub fn effective_status(&self, now: i64) -> VoucherStatus {
        if self.status == VoucherStatus::Revoked {
            VoucherStatus::Revoked
        } else if self.is_expired(now) {
            VoucherStatus::Expired
        } else if self.used_plays >= self.assigned_plays {
            VoucherStatus::Exhausted
        } else {
            VoucherStatus::Active
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voucher_with(assigned: u32, expires_in_minutes: Option<i64>) -> Voucher {
        Voucher::new(
            "user-1".to_string(),
            OwnerType::Individual,
            None,
            assigned,
            50.0,
            expires_in_minutes,
        )
    }

    #[test]
    fn test_token_shape() {
        let token = Voucher::generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_tokens_differ() {
        assert_ne!(Voucher::generate_token(), Voucher::generate_token());
    }

    #[test]
    fn test_new_voucher_is_active() {
        let v = voucher_with(3, Some(60));
        assert_eq!(v.status, VoucherStatus::Active);
        assert_eq!(v.used_plays, 0);
        assert_eq!(v.remaining_plays(), 3);
        assert_eq!(v.expires_at, Some(v.created_at + 3600));
        assert!(v.is_redeemable(v.created_at));
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let v = voucher_with(1, None);
        assert!(!v.is_expired(v.created_at + 100 * 365 * 24 * 3600));
    }

    #[test]
    fn test_expiry_boundary() {
        let v = voucher_with(1, Some(10));
        let expires_at = v.expires_at.unwrap();
        // 到期时刻本身视为已过期（now >= expires_at）
        assert!(!v.is_expired(expires_at - 1));
        assert!(v.is_expired(expires_at));
        assert!(v.is_expired(expires_at + 1));
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let v = voucher_with(1, Some(0));
        assert!(v.is_expired(v.created_at));
        assert!(!v.is_redeemable(v.created_at));
        assert_eq!(v.effective_status(v.created_at), VoucherStatus::Expired);
    }

    #[test]
    fn test_effective_status_transitions() {
        let mut v = voucher_with(2, Some(60));
        let now = v.created_at;
        assert_eq!(v.effective_status(now), VoucherStatus::Active);

        v.used_plays = 2;
        assert_eq!(v.effective_status(now), VoucherStatus::Exhausted);
        assert!(!v.is_redeemable(now));

        // 撤销优先于其他状态
        v.status = VoucherStatus::Revoked;
        assert_eq!(v.effective_status(now), VoucherStatus::Revoked);
    }

    #[test]
    fn test_owner_type_parse() {
        assert_eq!("individual".parse::<OwnerType>().unwrap(), OwnerType::Individual);
        assert_eq!("student".parse::<OwnerType>().unwrap(), OwnerType::Student);
        assert!("admin".parse::<OwnerType>().is_err());
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            VoucherStatus::Active,
            VoucherStatus::Expired,
            VoucherStatus::Exhausted,
            VoucherStatus::Revoked,
        ] {
            assert_eq!(status.to_string().parse::<VoucherStatus>().unwrap(), status);
        }
    }
}

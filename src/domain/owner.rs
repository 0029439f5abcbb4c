//! Voucher Owner Identity Models
//!
//! The voucher core treats owner ids as opaque; these records back the
//! optional owner-directory lookup at issuance and the auth surface.

use serde::{Deserialize, Serialize};

/// Self-registered individual player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndividualUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: i64,
}

impl IndividualUser {
    pub fn new(name: String, email: String, password_hash: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            email,
            password_hash,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Institution account (admin-operated tenant)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Institution {
    pub id: String,
    pub admin_name: String,
    pub institution_name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: i64,
}

impl Institution {
    pub fn new(
        admin_name: String,
        institution_name: String,
        email: String,
        password_hash: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            admin_name,
            institution_name,
            email,
            password_hash,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Institution-managed student, a possible voucher owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
    pub standard: String,  // grade level
    pub division: String,  // class section
    pub roll_number: String,
    pub institution_id: String,
    pub created_at: i64,
}

impl Student {
    pub fn new(
        name: String,
        email: String,
        standard: String,
        division: String,
        roll_number: String,
        institution_id: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            email,
            standard,
            division,
            roll_number,
            institution_id,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

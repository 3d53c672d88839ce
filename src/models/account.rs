use serde::{Deserialize, Serialize};

use super::enums::ScoreLogType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub scores: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
}

/// Row in the admin user listing.
#[derive(Debug, Clone, Serialize)]
pub struct UserItem {
    pub id: String,
    pub username: String,
    pub scores: i64,
    pub created_at: f64,
}

/// Credit ledger entry. `username` and `user_id` are filled only for
/// the admin listing.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreLogItem {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub amount: i64,
    pub balance: i64,
    pub prompt: Option<String>,
    pub image_path: Option<String>,
    pub log_type: ScoreLogType,
    pub created_at: f64,
}

/// New ledger entry passed to `record_score_log`.
#[derive(Debug, Clone)]
pub struct NewScoreLog<'a> {
    pub user_id: &'a str,
    pub amount: i64,
    /// Balance after the change; read from the user row when `None`.
    pub balance: Option<i64>,
    pub prompt: Option<&'a str>,
    pub image_path: Option<&'a str>,
    pub log_type: ScoreLogType,
}

/// Invite code as shown to the user who created it.
#[derive(Debug, Clone, Serialize)]
pub struct UserInviteCode {
    pub code: String,
    pub used: bool,
    pub used_at: Option<f64>,
    pub created_at: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InviteCodeItem {
    pub id: String,
    pub code: String,
    pub created_by_user_id: Option<String>,
    pub created_by_admin_id: Option<String>,
    pub used_by_user_id: Option<String>,
    pub used_at: Option<f64>,
    pub created_at: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RedemptionCodeItem {
    pub id: String,
    pub code: String,
    pub scores: i64,
    pub used_by_id: Option<String>,
    pub used_at: Option<f64>,
    pub created_at: f64,
}

/// Result of redeeming a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedeemOutcome {
    Redeemed { added: i64, balance: i64 },
    Invalid,
    AlreadyUsed,
}

/// Result of an admin code deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeDeletion {
    Deleted,
    AlreadyUsed,
    NotFound,
}

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::auth::codes::{generate_invite_code, generate_redemption_code};
use crate::db::{epoch_seconds, timestamp_now, DatabaseError};
use crate::models::enums::ScoreLogType;
use crate::models::*;

use super::account::{create_user, get_user_by_id, get_user_by_username};
use super::score::{get_user_scores, record_score_log};

/// Invite codes a single user may create.
pub const MAX_INVITE_CODES_PER_USER: i64 = 3;

fn code_exists(conn: &Connection, table: &str, code: &str) -> Result<bool, DatabaseError> {
    let exists: i64 = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE code = ?1)"),
        params![code],
        |row| row.get(0),
    )?;
    Ok(exists != 0)
}

/// Draw codes until one is unused both in this batch and in `table`.
fn unique_code(
    conn: &Connection,
    table: &str,
    batch: &mut HashSet<String>,
    generate: fn() -> String,
) -> Result<String, DatabaseError> {
    loop {
        let code = generate();
        if batch.contains(&code) || code_exists(conn, table, &code)? {
            continue;
        }
        batch.insert(code.clone());
        return Ok(code);
    }
}

fn optional_epoch(ts: Option<String>) -> Option<f64> {
    ts.as_deref().map(epoch_seconds)
}

// ═══════════════════════════════════════════════════════════
// Redemption codes
// ═══════════════════════════════════════════════════════════

pub fn create_redemption_codes(
    conn: &Connection,
    scores: i64,
    count: usize,
    admin_id: &str,
) -> Result<Vec<String>, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let mut batch = HashSet::new();
    let mut codes = Vec::with_capacity(count);
    for _ in 0..count {
        let code = unique_code(&tx, "redemption_codes", &mut batch, generate_redemption_code)?;
        tx.execute(
            "INSERT INTO redemption_codes (id, code, scores, created_by_admin_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![Uuid::new_v4().to_string(), code, scores, admin_id, timestamp_now()],
        )?;
        codes.push(code);
    }
    tx.commit()?;
    Ok(codes)
}

/// Redeem a code for a user: mark it used and credit the balance together.
pub fn use_redemption_code(conn: &Connection, code: &str, user_id: &str) -> Result<RedeemOutcome, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let row: Option<(String, i64, Option<String>)> = tx
        .query_row(
            "SELECT id, scores, used_by_id FROM redemption_codes WHERE code = ?1",
            params![code],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    let Some((id, scores, used_by)) = row else {
        return Ok(RedeemOutcome::Invalid);
    };
    if used_by.is_some() {
        return Ok(RedeemOutcome::AlreadyUsed);
    }
    if get_user_by_id(&tx, user_id)?.is_none() {
        return Ok(RedeemOutcome::Invalid);
    }

    tx.execute(
        "UPDATE redemption_codes SET used_by_id = ?2, used_at = ?3 WHERE id = ?1",
        params![id, user_id, timestamp_now()],
    )?;
    tx.execute(
        "UPDATE users SET scores = scores + ?2 WHERE id = ?1",
        params![user_id, scores],
    )?;
    let balance = get_user_scores(&tx, user_id)?;
    tx.commit()?;
    Ok(RedeemOutcome::Redeemed { added: scores, balance })
}

pub fn list_redemption_codes_admin(
    conn: &Connection,
    used: Option<bool>,
    skip: i64,
    limit: i64,
) -> Result<(Vec<RedemptionCodeItem>, i64), DatabaseError> {
    let filter = used_filter("used_by_id", used);
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM redemption_codes WHERE {filter}"),
        [],
        |row| row.get(0),
    )?;
    let mut stmt = conn.prepare(&format!(
        "SELECT id, code, scores, used_by_id, used_at, created_at FROM redemption_codes
         WHERE {filter} ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2"
    ))?;
    let rows = stmt.query_map(params![limit, skip], |row| {
        Ok(RedemptionCodeItem {
            id: row.get(0)?,
            code: row.get(1)?,
            scores: row.get(2)?,
            used_by_id: row.get(3)?,
            used_at: optional_epoch(row.get(4)?),
            created_at: epoch_seconds(&row.get::<_, String>(5)?),
        })
    })?;
    let items = rows.map(|r| r.map_err(DatabaseError::from)).collect::<Result<_, _>>()?;
    Ok((items, total))
}

pub fn delete_redemption_code_admin(conn: &Connection, id: &str) -> Result<CodeDeletion, DatabaseError> {
    delete_unused_code(conn, "redemption_codes", "used_by_id", id)
}

// ═══════════════════════════════════════════════════════════
// Invite codes
// ═══════════════════════════════════════════════════════════

/// Unused invite code row id, if `code` can still be redeemed.
fn open_invite_id(conn: &Connection, code: &str) -> Result<Option<String>, DatabaseError> {
    let row: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT id, used_by_user_id FROM invite_codes WHERE code = ?1",
            params![code],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(row.and_then(|(id, used_by)| used_by.is_none().then_some(id)))
}

pub fn invite_code_is_open(conn: &Connection, code: &str) -> Result<bool, DatabaseError> {
    Ok(open_invite_id(conn, code)?.is_some())
}

pub fn count_invite_codes_by_user(conn: &Connection, user_id: &str) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM invite_codes WHERE created_by_user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Create one invite code for a user; `None` once the user holds the maximum.
pub fn create_invite_code_by_user(conn: &Connection, user_id: &str) -> Result<Option<String>, DatabaseError> {
    if count_invite_codes_by_user(conn, user_id)? >= MAX_INVITE_CODES_PER_USER {
        return Ok(None);
    }
    let code = unique_code(conn, "invite_codes", &mut HashSet::new(), generate_invite_code)?;
    conn.execute(
        "INSERT INTO invite_codes (id, code, created_by_user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![Uuid::new_v4().to_string(), code, user_id, timestamp_now()],
    )?;
    Ok(Some(code))
}

pub fn create_invite_codes_by_admin(
    conn: &Connection,
    count: usize,
    admin_id: &str,
) -> Result<Vec<String>, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let mut batch = HashSet::new();
    let mut codes = Vec::with_capacity(count);
    for _ in 0..count {
        let code = unique_code(&tx, "invite_codes", &mut batch, generate_invite_code)?;
        tx.execute(
            "INSERT INTO invite_codes (id, code, created_by_admin_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![Uuid::new_v4().to_string(), code, admin_id, timestamp_now()],
        )?;
        codes.push(code);
    }
    tx.commit()?;
    Ok(codes)
}

/// Mark an open invite code as used by `new_user_id`.
pub fn use_invite_code(conn: &Connection, code: &str, new_user_id: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE invite_codes SET used_by_user_id = ?2, used_at = ?3
         WHERE code = ?1 AND used_by_user_id IS NULL",
        params![code, new_user_id, timestamp_now()],
    )?;
    Ok(changed > 0)
}

pub fn list_invite_codes_by_user(conn: &Connection, user_id: &str) -> Result<Vec<UserInviteCode>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT code, used_by_user_id, used_at, created_at FROM invite_codes
         WHERE created_by_user_id = ?1 ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok(UserInviteCode {
            code: row.get(0)?,
            used: row.get::<_, Option<String>>(1)?.is_some(),
            used_at: optional_epoch(row.get(2)?),
            created_at: epoch_seconds(&row.get::<_, String>(3)?),
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn list_invite_codes_admin(
    conn: &Connection,
    used: Option<bool>,
    skip: i64,
    limit: i64,
) -> Result<(Vec<InviteCodeItem>, i64), DatabaseError> {
    let filter = used_filter("used_by_user_id", used);
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM invite_codes WHERE {filter}"),
        [],
        |row| row.get(0),
    )?;
    let mut stmt = conn.prepare(&format!(
        "SELECT id, code, created_by_user_id, created_by_admin_id, used_by_user_id, used_at, created_at
         FROM invite_codes WHERE {filter}
         ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2"
    ))?;
    let rows = stmt.query_map(params![limit, skip], |row| {
        Ok(InviteCodeItem {
            id: row.get(0)?,
            code: row.get(1)?,
            created_by_user_id: row.get(2)?,
            created_by_admin_id: row.get(3)?,
            used_by_user_id: row.get(4)?,
            used_at: optional_epoch(row.get(5)?),
            created_at: epoch_seconds(&row.get::<_, String>(6)?),
        })
    })?;
    let items = rows.map(|r| r.map_err(DatabaseError::from)).collect::<Result<_, _>>()?;
    Ok((items, total))
}

pub fn delete_invite_code_admin(conn: &Connection, id: &str) -> Result<CodeDeletion, DatabaseError> {
    delete_unused_code(conn, "invite_codes", "used_by_user_id", id)
}

fn used_filter(column: &str, used: Option<bool>) -> String {
    match used {
        Some(true) => format!("{column} IS NOT NULL"),
        Some(false) => format!("{column} IS NULL"),
        None => "1 = 1".into(),
    }
}

fn delete_unused_code(
    conn: &Connection,
    table: &str,
    used_column: &str,
    id: &str,
) -> Result<CodeDeletion, DatabaseError> {
    let used: Option<Option<String>> = conn
        .query_row(
            &format!("SELECT {used_column} FROM {table} WHERE id = ?1"),
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    match used {
        None => Ok(CodeDeletion::NotFound),
        Some(Some(_)) => Ok(CodeDeletion::AlreadyUsed),
        Some(None) => {
            conn.execute(&format!("DELETE FROM {table} WHERE id = ?1"), params![id])?;
            Ok(CodeDeletion::Deleted)
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Registration
// ═══════════════════════════════════════════════════════════

/// Ledger text for the registration bonus.
pub const REGISTER_BONUS_LOG_PROMPT: &str = "Registration bonus";

#[derive(Debug, Clone)]
pub enum RegisterOutcome {
    Registered(User),
    InvalidInvite,
    UsernameTaken,
}

/// Consume an invite code and create the account with its bonus, all in
/// one transaction.
pub fn register_user(
    conn: &Connection,
    invite_code: &str,
    username: &str,
    password_hash: &str,
    bonus: i64,
) -> Result<RegisterOutcome, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    if open_invite_id(&tx, invite_code)?.is_none() {
        return Ok(RegisterOutcome::InvalidInvite);
    }
    if get_user_by_username(&tx, username)?.is_some() {
        return Ok(RegisterOutcome::UsernameTaken);
    }
    let Some(user) = create_user(&tx, username, password_hash, bonus)? else {
        return Ok(RegisterOutcome::UsernameTaken);
    };
    if !use_invite_code(&tx, invite_code, &user.id)? {
        return Ok(RegisterOutcome::InvalidInvite);
    }
    if bonus > 0 {
        record_score_log(
            &tx,
            &NewScoreLog {
                user_id: &user.id,
                amount: bonus,
                balance: Some(user.scores),
                prompt: Some(REGISTER_BONUS_LOG_PROMPT),
                image_path: None,
                log_type: ScoreLogType::Recharge,
            },
        )?;
    }
    tx.commit()?;
    Ok(RegisterOutcome::Registered(user))
}

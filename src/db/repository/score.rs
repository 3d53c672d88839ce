use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{epoch_seconds, timestamp_now, DatabaseError};
use crate::models::enums::ScoreLogType;
use crate::models::*;

pub const SCORES_PER_SLIDE_KEY: &str = "scores_per_slide";
pub const REGISTER_BONUS_KEY: &str = "register_bonus_scores";

const DEFAULT_SCORES_PER_SLIDE: i64 = 1;
const DEFAULT_REGISTER_BONUS: i64 = 50;
const SCORE_LOG_PROMPT_MAX_CHARS: usize = 500;

// ═══════════════════════════════════════════════════════════
// Balances
// ═══════════════════════════════════════════════════════════

/// Current balance; 0 for unknown users.
pub fn get_user_scores(conn: &Connection, user_id: &str) -> Result<i64, DatabaseError> {
    let scores = conn
        .query_row("SELECT scores FROM users WHERE id = ?1", params![user_id], |row| row.get(0))
        .optional()?;
    Ok(scores.unwrap_or(0))
}

/// Debit `amount` only if the balance covers it. The check and the debit
/// are one statement, so concurrent jobs cannot overdraw.
pub fn deduct_scores(conn: &Connection, user_id: &str, amount: i64) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET scores = scores - ?2 WHERE id = ?1 AND scores >= ?2",
        params![user_id, amount],
    )?;
    Ok(changed > 0)
}

pub fn add_scores(conn: &Connection, user_id: &str, amount: i64) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET scores = scores + ?2 WHERE id = ?1",
        params![user_id, amount],
    )?;
    Ok(changed > 0)
}

// ═══════════════════════════════════════════════════════════
// System config
// ═══════════════════════════════════════════════════════════

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, DatabaseError> {
    let value = conn
        .query_row("SELECT value FROM system_config WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO system_config (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn config_int(conn: &Connection, key: &str, default: i64, min: i64) -> Result<i64, DatabaseError> {
    Ok(match get_config(conn, key)? {
        Some(raw) => raw.trim().parse::<i64>().map(|v| v.max(min)).unwrap_or(default),
        None => default,
    })
}

/// Credits charged per rendered slide, never below 1.
pub fn get_scores_per_slide(conn: &Connection) -> Result<i64, DatabaseError> {
    config_int(conn, SCORES_PER_SLIDE_KEY, DEFAULT_SCORES_PER_SLIDE, 1)
}

/// Credits granted on registration, never negative.
pub fn get_register_bonus_scores(conn: &Connection) -> Result<i64, DatabaseError> {
    config_int(conn, REGISTER_BONUS_KEY, DEFAULT_REGISTER_BONUS, 0)
}

// ═══════════════════════════════════════════════════════════
// Score logs
// ═══════════════════════════════════════════════════════════

pub fn record_score_log(conn: &Connection, log: &NewScoreLog<'_>) -> Result<(), DatabaseError> {
    let balance = match log.balance {
        Some(balance) => balance,
        None => get_user_scores(conn, log.user_id)?,
    };
    let prompt: Option<String> = log
        .prompt
        .map(|p| p.chars().take(SCORE_LOG_PROMPT_MAX_CHARS).collect());
    conn.execute(
        "INSERT INTO score_logs (id, user_id, amount, balance, prompt, image_path, log_type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            Uuid::new_v4().to_string(),
            log.user_id,
            log.amount,
            balance,
            prompt,
            log.image_path,
            log.log_type.as_str(),
            timestamp_now(),
        ],
    )?;
    Ok(())
}

fn query_score_logs(
    conn: &Connection,
    user_filter: Option<&str>,
    with_user: bool,
    skip: i64,
    limit: i64,
) -> Result<(Vec<ScoreLogItem>, i64), DatabaseError> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM score_logs WHERE (?1 IS NULL OR user_id = ?1)",
        params![user_filter],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT l.id, l.user_id, u.username, l.amount, l.balance, l.prompt, l.image_path,
                l.log_type, l.created_at
         FROM score_logs l LEFT JOIN users u ON u.id = l.user_id
         WHERE (?1 IS NULL OR l.user_id = ?1)
         ORDER BY l.created_at DESC, l.rowid DESC
         LIMIT ?2 OFFSET ?3",
    )?;
    let rows = stmt.query_map(params![user_filter, limit, skip], |row| {
        Ok((
            ScoreLogItem {
                id: row.get(0)?,
                user_id: with_user.then(|| row.get(1)).transpose()?,
                username: if with_user { row.get(2)? } else { None },
                amount: row.get(3)?,
                balance: row.get(4)?,
                prompt: row.get(5)?,
                image_path: row.get(6)?,
                log_type: ScoreLogType::Consume,
                created_at: epoch_seconds(&row.get::<_, String>(8)?),
            },
            row.get::<_, String>(7)?,
        ))
    })?;

    let mut items = Vec::new();
    for row in rows {
        let (mut item, log_type) = row?;
        item.log_type = ScoreLogType::from_str(&log_type)?;
        items.push(item);
    }
    Ok((items, total))
}

/// Debit one rendered slide and log the consumption. Returns `false`
/// without logging when the balance no longer covers it.
pub fn charge_slide(
    conn: &Connection,
    user_id: &str,
    amount: i64,
    prompt: &str,
    image_path: &str,
) -> Result<bool, DatabaseError> {
    if !deduct_scores(conn, user_id, amount)? {
        return Ok(false);
    }
    record_score_log(
        conn,
        &NewScoreLog {
            user_id,
            amount,
            balance: None,
            prompt: Some(prompt),
            image_path: Some(image_path),
            log_type: ScoreLogType::Consume,
        },
    )?;
    Ok(true)
}

pub fn list_score_logs_by_user(
    conn: &Connection,
    user_id: &str,
    skip: i64,
    limit: i64,
) -> Result<(Vec<ScoreLogItem>, i64), DatabaseError> {
    query_score_logs(conn, Some(user_id), false, skip, limit)
}

pub fn list_score_logs_admin(
    conn: &Connection,
    user_filter: Option<&str>,
    skip: i64,
    limit: i64,
) -> Result<(Vec<ScoreLogItem>, i64), DatabaseError> {
    query_score_logs(conn, user_filter, true, skip, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::db::repository::create_user;

    fn setup(scores: i64) -> (Connection, String) {
        let conn = open_memory_database().unwrap();
        let user = create_user(&conn, "alice", "hash", scores).unwrap().unwrap();
        (conn, user.id)
    }

    #[test]
    fn deduct_refuses_overdraw() {
        let (conn, uid) = setup(2);
        assert!(deduct_scores(&conn, &uid, 2).unwrap());
        assert!(!deduct_scores(&conn, &uid, 1).unwrap());
        assert_eq!(get_user_scores(&conn, &uid).unwrap(), 0);
    }

    #[test]
    fn add_scores_credits_balance() {
        let (conn, uid) = setup(1);
        assert!(add_scores(&conn, &uid, 9).unwrap());
        assert_eq!(get_user_scores(&conn, &uid).unwrap(), 10);
        assert_eq!(get_user_scores(&conn, "missing").unwrap(), 0);
    }

    #[test]
    fn config_defaults_and_clamps() {
        let (conn, _) = setup(0);
        assert_eq!(get_scores_per_slide(&conn).unwrap(), 1);
        assert_eq!(get_register_bonus_scores(&conn).unwrap(), 50);

        set_config(&conn, SCORES_PER_SLIDE_KEY, "0").unwrap();
        set_config(&conn, REGISTER_BONUS_KEY, "-5").unwrap();
        assert_eq!(get_scores_per_slide(&conn).unwrap(), 1);
        assert_eq!(get_register_bonus_scores(&conn).unwrap(), 0);

        set_config(&conn, SCORES_PER_SLIDE_KEY, "abc").unwrap();
        assert_eq!(get_scores_per_slide(&conn).unwrap(), 1);
        set_config(&conn, SCORES_PER_SLIDE_KEY, "4").unwrap();
        assert_eq!(get_scores_per_slide(&conn).unwrap(), 4);
    }

    #[test]
    fn score_log_truncates_prompt_and_reads_balance() {
        let (conn, uid) = setup(7);
        let long_prompt = "x".repeat(800);
        record_score_log(
            &conn,
            &NewScoreLog {
                user_id: &uid,
                amount: 1,
                balance: None,
                prompt: Some(&long_prompt),
                image_path: Some("/images/p/1.png"),
                log_type: ScoreLogType::Consume,
            },
        )
        .unwrap();

        let (logs, total) = list_score_logs_by_user(&conn, &uid, 0, 20).unwrap();
        assert_eq!(total, 1);
        assert_eq!(logs[0].balance, 7);
        assert_eq!(logs[0].prompt.as_ref().unwrap().chars().count(), 500);
        assert!(logs[0].username.is_none());
    }

    #[test]
    fn admin_logs_carry_username_and_filter() {
        let (conn, uid) = setup(0);
        let other = create_user(&conn, "bob", "hash", 0).unwrap().unwrap();
        for user in [&uid, &other.id] {
            record_score_log(
                &conn,
                &NewScoreLog {
                    user_id: user,
                    amount: 10,
                    balance: Some(10),
                    prompt: Some("Redemption code recharge"),
                    image_path: None,
                    log_type: ScoreLogType::Recharge,
                },
            )
            .unwrap();
        }

        let (all, total) = list_score_logs_admin(&conn, None, 0, 20).unwrap();
        assert_eq!((all.len(), total), (2, 2));
        let (bob, total) = list_score_logs_admin(&conn, Some(&other.id), 0, 20).unwrap();
        assert_eq!(total, 1);
        assert_eq!(bob[0].username.as_deref(), Some("bob"));
        assert_eq!(bob[0].log_type, ScoreLogType::Recharge);
    }

    #[test]
    fn charge_slide_debits_and_logs() {
        let (conn, uid) = setup(3);
        assert!(charge_slide(&conn, &uid, 2, "cover", "/images/p/a.png").unwrap());
        assert!(!charge_slide(&conn, &uid, 2, "second", "/images/p/b.png").unwrap());

        let (logs, total) = list_score_logs_by_user(&conn, &uid, 0, 10).unwrap();
        assert_eq!(total, 1);
        assert_eq!(logs[0].balance, 1);
        assert_eq!(logs[0].log_type, ScoreLogType::Consume);
        assert_eq!(logs[0].image_path.as_deref(), Some("/images/p/a.png"));
    }
}

use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::{epoch_seconds, timestamp_now, DatabaseError};
use crate::models::*;

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        scores: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn admin_from_row(row: &Row<'_>) -> rusqlite::Result<Admin> {
    Ok(Admin {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: row.get(3)?,
    })
}

// ═══════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════

pub fn get_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>, DatabaseError> {
    let user = conn
        .query_row(
            "SELECT id, username, password_hash, scores, created_at FROM users WHERE username = ?1",
            params![username],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>, DatabaseError> {
    let user = conn
        .query_row(
            "SELECT id, username, password_hash, scores, created_at FROM users WHERE id = ?1",
            params![id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// Create a user. `None` when the username is already taken.
pub fn create_user(
    conn: &Connection,
    username: &str,
    password_hash: &str,
    initial_scores: i64,
) -> Result<Option<User>, DatabaseError> {
    if get_user_by_username(conn, username)?.is_some() {
        return Ok(None);
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users (id, username, password_hash, scores, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, username, password_hash, initial_scores, timestamp_now()],
    )?;
    get_user_by_id(conn, &id)
}

pub fn update_user_password(conn: &Connection, id: &str, password_hash: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ?2 WHERE id = ?1",
        params![id, password_hash],
    )?;
    Ok(changed > 0)
}

pub fn list_users_admin(
    conn: &Connection,
    skip: i64,
    limit: i64,
) -> Result<(Vec<UserItem>, i64), DatabaseError> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    let mut stmt = conn.prepare(
        "SELECT id, username, scores, created_at FROM users
         ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
    )?;
    let rows = stmt.query_map(params![limit, skip], |row| {
        Ok(UserItem {
            id: row.get(0)?,
            username: row.get(1)?,
            scores: row.get(2)?,
            created_at: epoch_seconds(&row.get::<_, String>(3)?),
        })
    })?;
    let items = rows.map(|r| r.map_err(DatabaseError::from)).collect::<Result<_, _>>()?;
    Ok((items, total))
}

// ═══════════════════════════════════════════════════════════
// Admins
// ═══════════════════════════════════════════════════════════

pub fn get_admin_by_username(conn: &Connection, username: &str) -> Result<Option<Admin>, DatabaseError> {
    let admin = conn
        .query_row(
            "SELECT id, username, password_hash, created_at FROM admins WHERE username = ?1",
            params![username],
            admin_from_row,
        )
        .optional()?;
    Ok(admin)
}

pub fn get_admin_by_id(conn: &Connection, id: &str) -> Result<Option<Admin>, DatabaseError> {
    let admin = conn
        .query_row(
            "SELECT id, username, password_hash, created_at FROM admins WHERE id = ?1",
            params![id],
            admin_from_row,
        )
        .optional()?;
    Ok(admin)
}

pub fn count_admins(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM admins", [], |row| row.get(0))?;
    Ok(count)
}

/// Create an admin when none exists yet. Returns whether one was created.
pub fn ensure_default_admin(
    conn: &Connection,
    username: &str,
    password_hash: &str,
) -> Result<bool, DatabaseError> {
    if count_admins(conn)? > 0 {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO admins (id, username, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![Uuid::new_v4().to_string(), username, password_hash, timestamp_now()],
    )?;
    tracing::info!(username, "Seeded default admin account");
    Ok(true)
}

pub fn update_admin_password(conn: &Connection, id: &str, password_hash: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE admins SET password_hash = ?2 WHERE id = ?1",
        params![id, password_hash],
    )?;
    Ok(changed > 0)
}

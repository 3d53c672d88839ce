use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use uuid::Uuid;

use crate::db::{epoch_seconds, timestamp_now, DatabaseError};
use crate::models::enums::GenerationStatus;
use crate::models::*;

use super::slide::{list_versions, list_visible_slides};

const PRESENTATION_COLUMNS: &str = "p.id, p.user_id, p.title, p.topic, p.global_style, p.created_at,
    p.updated_at, p.deleted_at, p.generation_status, p.generation_current, p.generation_total,
    p.generation_error, p.params, p.is_published, p.published_at";

/// Raw column values; enum and JSON decoding happen in `presentation_from_row`.
struct PresentationRow {
    id: String,
    user_id: Option<String>,
    title: String,
    topic: Option<String>,
    global_style: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
    generation_status: String,
    generation_current: i64,
    generation_total: i64,
    generation_error: Option<String>,
    params: Option<String>,
    is_published: i64,
    published_at: Option<String>,
}

fn presentation_row_from_rusqlite(row: &Row<'_>) -> rusqlite::Result<PresentationRow> {
    Ok(PresentationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        topic: row.get(3)?,
        global_style: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        deleted_at: row.get(7)?,
        generation_status: row.get(8)?,
        generation_current: row.get(9)?,
        generation_total: row.get(10)?,
        generation_error: row.get(11)?,
        params: row.get(12)?,
        is_published: row.get(13)?,
        published_at: row.get(14)?,
    })
}

fn presentation_from_row(row: PresentationRow) -> Result<Presentation, DatabaseError> {
    Ok(Presentation {
        params: parse_params(row.params.as_deref())?,
        generation_status: GenerationStatus::from_str(&row.generation_status)?,
        id: row.id,
        user_id: row.user_id,
        title: row.title,
        topic: row.topic,
        global_style: row.global_style,
        created_at: row.created_at,
        updated_at: row.updated_at,
        deleted_at: row.deleted_at,
        generation_current: row.generation_current,
        generation_total: row.generation_total,
        generation_error: row.generation_error,
        is_published: row.is_published != 0,
        published_at: row.published_at,
    })
}

fn parse_params(raw: Option<&str>) -> Result<Option<Value>, DatabaseError> {
    match raw {
        None | Some("") => Ok(None),
        Some(text) => serde_json::from_str(text)
            .map(Some)
            .map_err(|e| DatabaseError::InvalidJson {
                column: "presentations.params".into(),
                reason: e.to_string(),
            }),
    }
}

fn query_presentations(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Presentation>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| Ok(presentation_row_from_rusqlite(row)))?;

    let mut items = Vec::new();
    for row in rows {
        items.push(presentation_from_row(row??)?);
    }
    Ok(items)
}

/// Image of the newest version on the first visible slide.
fn preview_image(conn: &Connection, presentation_id: &str) -> Result<Option<String>, DatabaseError> {
    let preview = conn
        .query_row(
            "SELECT v.image_path FROM slides s
             JOIN slide_versions v ON v.slide_id = s.id
             WHERE s.presentation_id = ?1 AND s.deleted_at IS NULL
             ORDER BY s.position ASC, v.version_number DESC
             LIMIT 1",
            params![presentation_id],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(preview)
}

fn username_for(conn: &Connection, user_id: Option<&str>) -> Result<Option<String>, DatabaseError> {
    let Some(user_id) = user_id else {
        return Ok(None);
    };
    let name = conn
        .query_row(
            "SELECT username FROM users WHERE id = ?1",
            params![user_id],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(name)
}

fn owned_by(p: &Presentation, owner: Option<&str>) -> bool {
    match owner {
        Some(owner) => p.user_id.as_deref() == Some(owner),
        None => true,
    }
}

// ═══════════════════════════════════════════════════════════
// CRUD
// ═══════════════════════════════════════════════════════════

pub fn create_presentation(
    conn: &Connection,
    topic: &str,
    title: Option<&str>,
    user_id: Option<&str>,
) -> Result<String, DatabaseError> {
    let id = Uuid::new_v4().to_string();
    let now = timestamp_now();
    conn.execute(
        "INSERT INTO presentations (id, user_id, title, topic, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![id, user_id, title.unwrap_or(topic), topic, now],
    )?;
    Ok(id)
}

/// Presentation row, soft-deleted or not, optionally restricted to an owner.
pub fn find_presentation(
    conn: &Connection,
    id: &str,
    owner: Option<&str>,
) -> Result<Option<Presentation>, DatabaseError> {
    let sql = format!("SELECT {PRESENTATION_COLUMNS} FROM presentations p WHERE p.id = ?1");
    let found = query_presentations(conn, &sql, params![id])?.into_iter().next();
    Ok(found.filter(|p| owned_by(p, owner)))
}

pub fn get_presentation(
    conn: &Connection,
    id: &str,
    owner: Option<&str>,
) -> Result<Option<PresentationDetail>, DatabaseError> {
    let Some(p) = find_presentation(conn, id, owner)? else {
        return Ok(None);
    };
    let slides = super::slide::slide_views(conn, &p.id)?;
    Ok(Some(PresentationDetail {
        topic: p.display_topic(),
        created_at: epoch_seconds(&p.created_at),
        updated_at: epoch_seconds(&p.updated_at),
        id: p.id,
        user_id: p.user_id,
        title: p.title,
        global_style: p.global_style,
        slides,
        chat_history: Vec::new(),
        params: p.params,
    }))
}

pub fn list_presentations(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<PresentationSummary>, DatabaseError> {
    let sql = format!(
        "SELECT {PRESENTATION_COLUMNS} FROM presentations p
         WHERE p.deleted_at IS NULL AND p.user_id = ?1
         ORDER BY p.created_at DESC, p.rowid DESC"
    );
    let rows = query_presentations(conn, &sql, params![user_id])?;

    let mut items = Vec::with_capacity(rows.len());
    for p in rows {
        items.push(PresentationSummary {
            preview_image: preview_image(conn, &p.id)?,
            topic: p.display_topic(),
            created_at: epoch_seconds(&p.created_at),
            id: p.id,
            title: p.title,
            generation_status: p.generation_status,
            generation_current: p.generation_current,
            generation_total: p.generation_total,
            params: p.params,
            user_id: p.user_id,
            is_published: p.is_published as i64,
        });
    }
    Ok(items)
}

/// Apply the set fields of `patch`. Returns `false` when the presentation
/// does not exist.
pub fn update_presentation(
    conn: &Connection,
    id: &str,
    patch: &PresentationPatch,
) -> Result<bool, DatabaseError> {
    let params_json = patch
        .params
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DatabaseError::InvalidJson {
            column: "presentations.params".into(),
            reason: e.to_string(),
        })?;
    let changed = conn.execute(
        "UPDATE presentations SET
            title = COALESCE(?2, title),
            global_style = COALESCE(?3, global_style),
            params = COALESCE(?4, params),
            updated_at = ?5
         WHERE id = ?1",
        params![id, patch.title, patch.global_style, params_json, timestamp_now()],
    )?;
    Ok(changed > 0)
}

/// Merge `entries` into the stored params object, keeping other keys.
pub fn merge_presentation_params(
    conn: &Connection,
    id: &str,
    entries: serde_json::Map<String, Value>,
) -> Result<bool, DatabaseError> {
    let Some(p) = find_presentation(conn, id, None)? else {
        return Ok(false);
    };
    let mut merged = match p.params {
        Some(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    merged.extend(entries);
    update_presentation(
        conn,
        id,
        &PresentationPatch {
            params: Some(Value::Object(merged)),
            ..Default::default()
        },
    )
}

pub fn set_published(conn: &Connection, id: &str, published: bool) -> Result<bool, DatabaseError> {
    let now = timestamp_now();
    let published_at = published.then(|| now.clone());
    let changed = conn.execute(
        "UPDATE presentations SET is_published = ?2, published_at = ?3, updated_at = ?4
         WHERE id = ?1",
        params![id, published as i64, published_at, now],
    )?;
    Ok(changed > 0)
}

/// Publication flag, or `None` when the presentation does not exist.
pub fn presentation_is_published(conn: &Connection, id: &str) -> Result<Option<bool>, DatabaseError> {
    Ok(find_presentation(conn, id, None)?.map(|p| p.is_published))
}

// ═══════════════════════════════════════════════════════════
// Gallery
// ═══════════════════════════════════════════════════════════

pub fn list_published(
    conn: &Connection,
    skip: i64,
    limit: i64,
) -> Result<Vec<GalleryItem>, DatabaseError> {
    let sql = format!(
        "SELECT {PRESENTATION_COLUMNS}, u.username FROM presentations p
         JOIN users u ON u.id = p.user_id
         WHERE p.deleted_at IS NULL AND p.is_published = 1
         ORDER BY p.published_at DESC
         LIMIT ?1 OFFSET ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![limit, skip], |row| {
        Ok((presentation_row_from_rusqlite(row), row.get::<_, String>(15)?))
    })?;

    let mut items = Vec::new();
    for row in rows {
        let (raw, username) = row?;
        let p = presentation_from_row(raw?)?;
        items.push(GalleryItem {
            preview_image: preview_image(conn, &p.id)?,
            topic: p.display_topic(),
            created_at: epoch_seconds(&p.created_at),
            published_at: p.published_at.as_deref().map(epoch_seconds).unwrap_or(0.0),
            id: p.id,
            title: p.title,
            username: Some(username),
            user_id: p.user_id,
        });
    }
    Ok(items)
}

/// Read-only view of a published, non-deleted presentation.
pub fn get_presentation_public(
    conn: &Connection,
    id: &str,
) -> Result<Option<GalleryDetail>, DatabaseError> {
    let Some(p) = find_presentation(conn, id, None)? else {
        return Ok(None);
    };
    if !p.is_published || p.deleted_at.is_some() {
        return Ok(None);
    }

    let mut slides = Vec::new();
    for slide in list_visible_slides(conn, &p.id)? {
        let versions = list_versions(conn, &slide.id)?;
        let view = SlideView::new(&slide, &versions);
        let Some(active_id) = view.active_version_id.clone() else {
            continue;
        };
        let Some(active) = versions.iter().find(|v| v.id == active_id) else {
            continue;
        };
        slides.push(SlideView {
            versions: vec![VersionView::from(active)],
            ..view
        });
    }

    Ok(Some(GalleryDetail {
        username: username_for(conn, p.user_id.as_deref())?,
        topic: p.display_topic(),
        created_at: epoch_seconds(&p.created_at),
        updated_at: epoch_seconds(&p.updated_at),
        published_at: p.published_at.as_deref().map(epoch_seconds).unwrap_or(0.0),
        id: p.id,
        user_id: p.user_id,
        title: p.title,
        global_style: p.global_style,
        slides,
        chat_history: Vec::new(),
        params: p.params,
    }))
}

// ═══════════════════════════════════════════════════════════
// Recycle bin
// ═══════════════════════════════════════════════════════════

pub fn soft_delete_presentation(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE presentations SET deleted_at = ?2 WHERE id = ?1",
        params![id, timestamp_now()],
    )?;
    Ok(changed > 0)
}

pub fn restore_presentation(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE presentations SET deleted_at = NULL WHERE id = ?1",
        params![id],
    )?;
    Ok(changed > 0)
}

pub fn list_deleted_presentations(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<DeletedPresentation>, DatabaseError> {
    let sql = format!(
        "SELECT {PRESENTATION_COLUMNS} FROM presentations p
         WHERE p.deleted_at IS NOT NULL AND p.user_id = ?1
         ORDER BY p.deleted_at DESC"
    );
    let rows = query_presentations(conn, &sql, params![user_id])?;

    let mut items = Vec::with_capacity(rows.len());
    for p in rows {
        items.push(DeletedPresentation {
            preview_image: preview_image(conn, &p.id)?,
            topic: p.display_topic(),
            created_at: epoch_seconds(&p.created_at),
            deleted_at: p.deleted_at.as_deref().map(epoch_seconds).unwrap_or(0.0),
            id: p.id,
            title: p.title,
            params: p.params,
        });
    }
    Ok(items)
}

/// Physically delete a soft-deleted presentation. Slides and versions go
/// with it through the foreign-key cascade. Image files are the caller's job.
pub fn permanently_delete_presentation(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM presentations WHERE id = ?1 AND deleted_at IS NOT NULL",
        params![id],
    )?;
    Ok(changed > 0)
}

/// Permanently delete every soft-deleted presentation of a user.
/// Returns the removed ids so their image directories can be cleaned.
pub fn clear_recycle_bin(conn: &Connection, user_id: &str) -> Result<Vec<String>, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let ids: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT id FROM presentations WHERE deleted_at IS NOT NULL AND user_id = ?1",
        )?;
        let rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
        rows.collect::<Result<_, _>>()?
    };
    tx.execute(
        "DELETE FROM presentations WHERE deleted_at IS NOT NULL AND user_id = ?1",
        params![user_id],
    )?;
    tx.commit()?;
    Ok(ids)
}

// ═══════════════════════════════════════════════════════════
// Admin listing
// ═══════════════════════════════════════════════════════════

pub fn list_all_presentations_admin(
    conn: &Connection,
    user_filter: Option<&str>,
    skip: i64,
    limit: i64,
) -> Result<(Vec<AdminPresentationItem>, i64), DatabaseError> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM presentations
         WHERE deleted_at IS NULL AND (?1 IS NULL OR user_id = ?1)",
        params![user_filter],
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {PRESENTATION_COLUMNS} FROM presentations p
         WHERE p.deleted_at IS NULL AND (?1 IS NULL OR p.user_id = ?1)
         ORDER BY p.updated_at DESC
         LIMIT ?2 OFFSET ?3"
    );
    let rows = query_presentations(conn, &sql, params![user_filter, limit, skip])?;

    let mut items = Vec::with_capacity(rows.len());
    for p in rows {
        items.push(AdminPresentationItem {
            username: username_for(conn, p.user_id.as_deref())?,
            preview_image: preview_image(conn, &p.id)?,
            topic: p.display_topic(),
            created_at: epoch_seconds(&p.created_at),
            id: p.id,
            user_id: p.user_id,
            title: p.title,
            generation_status: p.generation_status,
            generation_current: p.generation_current,
            generation_total: p.generation_total,
            params: p.params,
        });
    }
    Ok((items, total))
}

// ═══════════════════════════════════════════════════════════
// Generation progress
// ═══════════════════════════════════════════════════════════

pub fn update_generation_progress(
    conn: &Connection,
    id: &str,
    status: GenerationStatus,
    current: i64,
    total: i64,
    error: Option<&str>,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE presentations SET generation_status = ?2, generation_current = ?3,
            generation_total = ?4, generation_error = ?5, updated_at = ?6
         WHERE id = ?1",
        params![id, status.as_str(), current, total, error, timestamp_now()],
    )?;
    Ok(changed > 0)
}

pub fn get_generation_progress(
    conn: &Connection,
    id: &str,
) -> Result<Option<GenerationProgress>, DatabaseError> {
    Ok(find_presentation(conn, id, None)?.map(|p| {
        GenerationProgress::new(
            p.generation_status,
            p.generation_current,
            p.generation_total,
            p.generation_error,
        )
    }))
}

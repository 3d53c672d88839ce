use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use crate::db::{timestamp_now, DatabaseError};
use crate::models::*;

const SLIDE_COLUMNS: &str =
    "id, presentation_id, position, active_version_id, created_at, updated_at, deleted_at";

const VERSION_COLUMNS: &str =
    "id, slide_id, image_path, prompt, base_image_path, version_number, created_at";

fn slide_from_row(row: &Row<'_>) -> rusqlite::Result<Slide> {
    Ok(Slide {
        id: row.get(0)?,
        presentation_id: row.get(1)?,
        position: row.get(2)?,
        active_version_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        deleted_at: row.get(6)?,
    })
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<SlideVersion> {
    Ok(SlideVersion {
        id: row.get(0)?,
        slide_id: row.get(1)?,
        image_path: row.get(2)?,
        prompt: row.get(3)?,
        base_image_path: row.get(4)?,
        version_number: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Version ids are the first 8 characters of a v4 UUID.
fn new_version_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

/// Non-deleted slides of a presentation in position order.
pub fn list_visible_slides(conn: &Connection, presentation_id: &str) -> Result<Vec<Slide>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SLIDE_COLUMNS} FROM slides
         WHERE presentation_id = ?1 AND deleted_at IS NULL
         ORDER BY position ASC, created_at ASC"
    ))?;
    let rows = stmt.query_map(params![presentation_id], slide_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Versions of a slide, oldest first.
pub fn list_versions(conn: &Connection, slide_id: &str) -> Result<Vec<SlideVersion>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VERSION_COLUMNS} FROM slide_versions
         WHERE slide_id = ?1 ORDER BY version_number ASC, created_at ASC"
    ))?;
    let rows = stmt.query_map(params![slide_id], version_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

pub fn slide_view(conn: &Connection, slide: &Slide) -> Result<SlideView, DatabaseError> {
    let versions = list_versions(conn, &slide.id)?;
    Ok(SlideView::new(slide, &versions))
}

pub fn slide_views(conn: &Connection, presentation_id: &str) -> Result<Vec<SlideView>, DatabaseError> {
    list_visible_slides(conn, presentation_id)?
        .iter()
        .map(|s| slide_view(conn, s))
        .collect()
}

pub fn get_slide_by_id(
    conn: &Connection,
    presentation_id: &str,
    slide_id: &str,
    include_deleted: bool,
) -> Result<Option<Slide>, DatabaseError> {
    let slide = conn
        .query_row(
            &format!(
                "SELECT {SLIDE_COLUMNS} FROM slides
                 WHERE presentation_id = ?1 AND id = ?2 AND (?3 OR deleted_at IS NULL)"
            ),
            params![presentation_id, slide_id, include_deleted],
            slide_from_row,
        )
        .optional()?;
    Ok(slide)
}

/// The `index`-th visible slide (0-based) in position order.
pub fn get_slide_by_position(
    conn: &Connection,
    presentation_id: &str,
    index: i64,
) -> Result<Option<Slide>, DatabaseError> {
    if index < 0 {
        return Ok(None);
    }
    let slides = list_visible_slides(conn, presentation_id)?;
    Ok(slides.into_iter().nth(index as usize))
}

fn insert_version(
    conn: &Connection,
    slide_id: &str,
    image_path: &str,
    prompt: &str,
    base_image_path: Option<&str>,
) -> Result<String, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM slide_versions WHERE slide_id = ?1",
        params![slide_id],
        |row| row.get(0),
    )?;
    let version_id = new_version_id();
    let now = timestamp_now();
    conn.execute(
        "INSERT INTO slide_versions (id, slide_id, image_path, prompt, base_image_path, version_number, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![version_id, slide_id, image_path, prompt, base_image_path, count + 1, now],
    )?;
    conn.execute(
        "UPDATE slides SET active_version_id = ?2, updated_at = ?3 WHERE id = ?1",
        params![slide_id, version_id, now],
    )?;
    Ok(version_id)
}

fn insert_slide(conn: &Connection, presentation_id: &str, position: i64) -> Result<String, DatabaseError> {
    let slide_id = Uuid::new_v4().to_string();
    let now = timestamp_now();
    conn.execute(
        "INSERT INTO slides (id, presentation_id, position, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![slide_id, presentation_id, position, now],
    )?;
    Ok(slide_id)
}

/// Add a version to the slide at visible index `index`, creating the slide
/// at that position when there is none yet. The new version becomes active.
pub fn add_slide_version(
    conn: &Connection,
    presentation_id: &str,
    index: i64,
    image_path: &str,
    prompt: &str,
    base_image_path: Option<&str>,
) -> Result<String, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let slide_id = match get_slide_by_position(&tx, presentation_id, index)? {
        Some(slide) => slide.id,
        None => insert_slide(&tx, presentation_id, index)?,
    };
    let version_id = insert_version(&tx, &slide_id, image_path, prompt, base_image_path)?;
    tx.commit()?;
    Ok(version_id)
}

/// Add a version to a visible slide by id. `None` if the slide is missing.
pub fn add_slide_version_by_slide_id(
    conn: &Connection,
    presentation_id: &str,
    slide_id: &str,
    image_path: &str,
    prompt: &str,
    base_image_path: Option<&str>,
) -> Result<Option<String>, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    if get_slide_by_id(&tx, presentation_id, slide_id, false)?.is_none() {
        return Ok(None);
    }
    let version_id = insert_version(&tx, slide_id, image_path, prompt, base_image_path)?;
    tx.commit()?;
    Ok(Some(version_id))
}

/// Created slide and its first version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsertedSlide {
    pub slide_id: String,
    pub version_id: String,
}

/// Insert a new slide at `target` and shift every slide at or after that
/// position (deleted ones included) one step back.
pub fn insert_slide_at_index(
    conn: &Connection,
    presentation_id: &str,
    target: i64,
    image_path: &str,
    prompt: &str,
) -> Result<InsertedSlide, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE slides SET position = position + 1
         WHERE presentation_id = ?1 AND position >= ?2",
        params![presentation_id, target],
    )?;
    let slide_id = insert_slide(&tx, presentation_id, target)?;
    let version_id = insert_version(&tx, &slide_id, image_path, prompt, None)?;
    tx.commit()?;
    Ok(InsertedSlide { slide_id, version_id })
}

/// Soft delete. Positions of the remaining slides are left untouched.
pub fn soft_delete_slide(conn: &Connection, presentation_id: &str, slide_id: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE slides SET deleted_at = ?3
         WHERE presentation_id = ?1 AND id = ?2 AND deleted_at IS NULL",
        params![presentation_id, slide_id, timestamp_now()],
    )?;
    Ok(changed > 0)
}

pub fn list_deleted_slides(conn: &Connection, presentation_id: &str) -> Result<Vec<SlideView>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SLIDE_COLUMNS} FROM slides
         WHERE presentation_id = ?1 AND deleted_at IS NOT NULL
         ORDER BY deleted_at DESC"
    ))?;
    let slides = stmt
        .query_map(params![presentation_id], slide_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    slides.iter().map(|s| slide_view(conn, s)).collect()
}

pub fn restore_slide(conn: &Connection, presentation_id: &str, slide_id: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE slides SET deleted_at = NULL WHERE presentation_id = ?1 AND id = ?2",
        params![presentation_id, slide_id],
    )?;
    Ok(changed > 0)
}

/// Point a visible slide at one of its own versions.
pub fn set_active_version(
    conn: &Connection,
    presentation_id: &str,
    slide_id: &str,
    version_id: &str,
) -> Result<bool, DatabaseError> {
    if get_slide_by_id(conn, presentation_id, slide_id, false)?.is_none() {
        return Ok(false);
    }
    let changed = conn.execute(
        "UPDATE slides SET active_version_id = ?2, updated_at = ?3
         WHERE id = ?1
           AND EXISTS (SELECT 1 FROM slide_versions WHERE id = ?2 AND slide_id = ?1)",
        params![slide_id, version_id, timestamp_now()],
    )?;
    Ok(changed > 0)
}

/// Delete a version. The only version of a slide cannot be deleted; if the
/// active version goes, the newest remaining one becomes active.
pub fn delete_version(
    conn: &Connection,
    presentation_id: &str,
    slide_id: &str,
    version_id: &str,
) -> Result<bool, DatabaseError> {
    let Some(slide) = get_slide_by_id(conn, presentation_id, slide_id, false)? else {
        return Ok(false);
    };
    let versions = list_versions(conn, slide_id)?;
    if versions.len() <= 1 || !versions.iter().any(|v| v.id == version_id) {
        return Ok(false);
    }

    let tx = conn.unchecked_transaction()?;
    if slide.active_version_id.as_deref() == Some(version_id) {
        let replacement = versions.iter().rev().find(|v| v.id != version_id).map(|v| v.id.clone());
        tx.execute(
            "UPDATE slides SET active_version_id = ?2, updated_at = ?3 WHERE id = ?1",
            params![slide_id, replacement, timestamp_now()],
        )?;
    }
    tx.execute("DELETE FROM slide_versions WHERE id = ?1", params![version_id])?;
    tx.commit()?;
    Ok(true)
}

/// Which slide's predecessor to look up.
#[derive(Debug, Clone, Copy)]
pub enum SlideAnchor<'a> {
    /// Visible index of the current slide.
    Position(i64),
    /// Id of the current slide.
    SlideId(&'a str),
}

fn active_or_latest_prompt(conn: &Connection, slide: &Slide) -> Result<Option<String>, DatabaseError> {
    let versions = list_versions(conn, &slide.id)?;
    let active = slide
        .active_version_id
        .as_deref()
        .and_then(|id| versions.iter().find(|v| v.id == id))
        .or_else(|| versions.last());
    Ok(active.and_then(|v| v.prompt.clone()))
}

/// Prompt of the visible slide before the anchor, used as a style reference
/// so consecutive slides stay visually consistent.
pub fn previous_slide_prompt(
    conn: &Connection,
    presentation_id: &str,
    anchor: SlideAnchor<'_>,
) -> Result<Option<String>, DatabaseError> {
    let slides = list_visible_slides(conn, presentation_id)?;
    let index = match anchor {
        SlideAnchor::Position(pos) => pos,
        SlideAnchor::SlideId(id) => match slides.iter().position(|s| s.id == id) {
            Some(idx) => idx as i64,
            None => return Ok(None),
        },
    };
    if index <= 0 {
        return Ok(None);
    }
    match slides.get((index - 1) as usize) {
        Some(prev) => active_or_latest_prompt(conn, prev),
        None => Ok(None),
    }
}

/// Prompt of the newest version of a slide.
pub fn latest_version_prompt(conn: &Connection, slide_id: &str) -> Result<Option<String>, DatabaseError> {
    let prompt = conn
        .query_row(
            "SELECT prompt FROM slide_versions WHERE slide_id = ?1
             ORDER BY version_number DESC LIMIT 1",
            params![slide_id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(prompt.flatten())
}

/// One chat turn reconstructed from a slide's version history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextMessage {
    pub role: &'static str,
    pub content: Option<String>,
}

/// Version history as alternating user prompt / assistant acknowledgement turns.
pub fn slide_context_messages(
    conn: &Connection,
    presentation_id: &str,
    slide_id: &str,
) -> Result<Vec<ContextMessage>, DatabaseError> {
    if get_slide_by_id(conn, presentation_id, slide_id, false)?.is_none() {
        return Ok(Vec::new());
    }
    let mut history = Vec::new();
    for version in list_versions(conn, slide_id)? {
        history.push(ContextMessage { role: "user", content: version.prompt });
        history.push(ContextMessage {
            role: "assistant",
            content: Some("Image generated.".into()),
        });
    }
    Ok(history)
}

//! Capsule, membership and clip records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info};

use crate::backend::CapsuleStore;
use crate::error::{Error, Result};
use crate::model::{Capsule, Clip};

use super::{decode_time, encode_time, Storage};

const CAPSULE_COLUMNS: &str = "c.id, c.name, c.creator_id, c.unlock_at, c.unsealed, \
                               c.unsealed_at, c.share_code, c.created_at";

const CLIP_COLUMNS: &str = "id, capsule_id, uploader_id, uploader_name, storage_path, \
                            recorded_at, uploaded_at, duration_ms, content_hash";

#[async_trait]
impl CapsuleStore for Storage {
    async fn create_capsule(&self, capsule: &Capsule) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                r"
                INSERT INTO capsules (id, name, creator_id, unlock_at, unsealed, unsealed_at, share_code, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ",
                params![
                    capsule.id,
                    capsule.name,
                    capsule.creator_id,
                    encode_time(capsule.unlock_at),
                    capsule.unsealed,
                    capsule.unsealed_at.map(encode_time),
                    capsule.share_code,
                    encode_time(capsule.created_at),
                ],
            )?;
            for member in &capsule.member_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO capsule_members (capsule_id, user_id) VALUES (?1, ?2)",
                    params![capsule.id, member],
                )?;
            }
            tx.commit()?;
            Ok(())
        })?;

        debug!("Created capsule {} ({})", capsule.id, capsule.name);
        Ok(())
    }

    async fn get_capsule(&self, id: &str) -> Result<Option<Capsule>> {
        self.with_conn(|conn| query_capsule(conn, id))
    }

    async fn capsules_for_member(&self, user_id: &str) -> Result<Vec<Capsule>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CAPSULE_COLUMNS} FROM capsules c
                 JOIN capsule_members m ON m.capsule_id = c.id
                 WHERE m.user_id = ?1
                 ORDER BY c.unlock_at ASC, c.id ASC"
            );
            query_capsules(conn, &sql, params![user_id])
        })
    }

    async fn find_by_share_code(&self, code: &str) -> Result<Option<Capsule>> {
        self.with_conn(|conn| {
            let id: Option<String> = conn
                .query_row(
                    "SELECT id FROM capsules WHERE share_code = ?1",
                    [code],
                    |row| row.get(0),
                )
                .optional()?;
            match id {
                Some(id) => query_capsule(conn, &id),
                None => Ok(None),
            }
        })
    }

    async fn add_member(&self, capsule_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            ensure_capsule_exists(conn, capsule_id)?;
            let affected = conn.execute(
                "INSERT OR IGNORE INTO capsule_members (capsule_id, user_id) VALUES (?1, ?2)",
                params![capsule_id, user_id],
            )?;
            Ok(affected > 0)
        })
    }

    async fn remove_member(&self, capsule_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            ensure_capsule_exists(conn, capsule_id)?;
            let affected = conn.execute(
                "DELETE FROM capsule_members WHERE capsule_id = ?1 AND user_id = ?2",
                params![capsule_id, user_id],
            )?;
            Ok(affected > 0)
        })
    }

    async fn due_for_unseal(&self, now: DateTime<Utc>) -> Result<Vec<Capsule>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CAPSULE_COLUMNS} FROM capsules c
                 WHERE c.unsealed = 0 AND c.unlock_at <= ?1
                 ORDER BY c.unlock_at ASC, c.id ASC"
            );
            query_capsules(conn, &sql, params![encode_time(now)])
        })
    }

    async fn mark_unsealed_if_sealed(&self, capsule_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let flipped = self.with_conn(|conn| {
            let affected = conn.execute(
                r"
                UPDATE capsules SET unsealed = 1, unsealed_at = ?2
                WHERE id = ?1 AND unsealed = 0 AND unlock_at <= ?2
                ",
                params![capsule_id, encode_time(at)],
            )?;
            Ok(affected > 0)
        })?;

        if flipped {
            info!("Capsule {} unsealed", capsule_id);
        }
        Ok(flipped)
    }

    async fn add_clip(&self, clip: &Clip) -> Result<()> {
        self.with_conn(|conn| {
            ensure_capsule_exists(conn, &clip.capsule_id)?;
            let duration_ms = clip
                .duration_ms
                .map(i64::try_from)
                .transpose()
                .map_err(|_| Error::validation("clip duration is out of range"))?;
            let inserted = conn.execute(
                &format!(
                    "INSERT INTO clips ({CLIP_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    clip.id,
                    clip.capsule_id,
                    clip.uploader_id,
                    clip.uploader_name,
                    clip.storage_path,
                    encode_time(clip.recorded_at),
                    encode_time(clip.uploaded_at),
                    duration_ms,
                    clip.content_hash,
                ],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
                    match clip_with_hash(conn, &clip.capsule_id, &clip.content_hash)? {
                        Some(clip_id) => Err(Error::DuplicateClip { clip_id }),
                        None => Err(e.into()),
                    }
                }
                Err(e) => Err(e.into()),
            }
        })?;

        debug!("Recorded clip {} in capsule {}", clip.id, clip.capsule_id);
        Ok(())
    }

    async fn clips_for_capsule(&self, capsule_id: &str) -> Result<Vec<Clip>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CLIP_COLUMNS} FROM clips WHERE capsule_id = ?1"
            ))?;
            let clips = stmt
                .query_map([capsule_id], row_to_clip)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(clips)
        })
    }
}

fn ensure_capsule_exists(conn: &Connection, capsule_id: &str) -> Result<()> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM capsules WHERE id = ?1", [capsule_id], |row| {
            row.get(0)
        })
        .optional()?;
    if exists.is_none() {
        return Err(Error::CapsuleNotFound {
            id: capsule_id.to_string(),
        });
    }
    Ok(())
}

/// Id of the clip in `capsule_id` whose contents hash to `content_hash`.
fn clip_with_hash(
    conn: &Connection,
    capsule_id: &str,
    content_hash: &str,
) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM clips WHERE capsule_id = ?1 AND content_hash = ?2",
            [capsule_id, content_hash],
            |row| row.get(0),
        )
        .optional()?)
}

fn query_capsule(conn: &Connection, id: &str) -> Result<Option<Capsule>> {
    let sql = format!("SELECT {CAPSULE_COLUMNS} FROM capsules c WHERE c.id = ?1");
    let capsule = conn.query_row(&sql, [id], row_to_capsule).optional()?;
    match capsule {
        Some(mut capsule) => {
            capsule.member_ids = query_members(conn, &capsule.id)?;
            Ok(Some(capsule))
        }
        None => Ok(None),
    }
}

fn query_capsules(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Capsule>> {
    let mut stmt = conn.prepare(sql)?;
    let mut capsules = stmt
        .query_map(params, row_to_capsule)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for capsule in &mut capsules {
        capsule.member_ids = query_members(conn, &capsule.id)?;
    }
    Ok(capsules)
}

/// Members in the order they joined.
fn query_members(conn: &Connection, capsule_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT user_id FROM capsule_members WHERE capsule_id = ?1 ORDER BY rowid ASC")?;
    let members = stmt
        .query_map([capsule_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(members)
}

/// Convert a row to a Capsule; members are filled in by the caller.
fn row_to_capsule(row: &rusqlite::Row) -> rusqlite::Result<Capsule> {
    let unsealed_at: Option<i64> = row.get(5)?;

    Ok(Capsule {
        id: row.get(0)?,
        name: row.get(1)?,
        creator_id: row.get(2)?,
        member_ids: Vec::new(),
        unlock_at: decode_time(3, row.get(3)?)?,
        unsealed: row.get(4)?,
        unsealed_at: unsealed_at.map(|t| decode_time(5, t)).transpose()?,
        share_code: row.get(6)?,
        created_at: decode_time(7, row.get(7)?)?,
    })
}

fn row_to_clip(row: &rusqlite::Row) -> rusqlite::Result<Clip> {
    let duration_ms: Option<i64> = row.get(7)?;

    Ok(Clip {
        id: row.get(0)?,
        capsule_id: row.get(1)?,
        uploader_id: row.get(2)?,
        uploader_name: row.get(3)?,
        storage_path: row.get(4)?,
        recorded_at: decode_time(5, row.get(5)?)?,
        uploaded_at: decode_time(6, row.get(6)?)?,
        duration_ms: duration_ms.and_then(|ms| u64::try_from(ms).ok()),
        content_hash: row.get(8)?,
    })
}

//! Pending local notifications.

use async_trait::async_trait;
use rusqlite::params;
use tracing::debug;

use crate::backend::NotificationScheduler;
use crate::error::{Error, Result};
use crate::model::{NotificationKind, ScheduledNotification};

use super::{decode_time, encode_time, Storage};

#[async_trait]
impl NotificationScheduler for Storage {
    async fn schedule(&self, notification: &ScheduledNotification) -> Result<()> {
        let (kind, days_before) = match notification.kind {
            NotificationKind::Unseal => ("unseal", None),
            NotificationKind::Reminder { days_before } => ("reminder", Some(days_before)),
        };

        self.with_conn(|conn| {
            conn.execute(
                r"
                INSERT OR REPLACE INTO notifications (id, capsule_id, kind, days_before, title, body, fire_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
                params![
                    notification.id,
                    notification.capsule_id,
                    kind,
                    days_before,
                    notification.title,
                    notification.body,
                    encode_time(notification.fire_at),
                ],
            )?;
            Ok(())
        })?;

        debug!(
            "Scheduled {} notification {} for {}",
            notification.kind, notification.id, notification.fire_at
        );
        Ok(())
    }

    async fn cancel(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM notifications WHERE id = ?1", [id])?;
            Ok(affected > 0)
        })
    }

    async fn pending(&self) -> Result<Vec<ScheduledNotification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, capsule_id, kind, days_before, title, body, fire_at
                 FROM notifications ORDER BY fire_at ASC, id ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<u32>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        decode_time(6, row.get(6)?)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(id, capsule_id, kind, days_before, title, body, fire_at)| {
                    let kind = match (kind.as_str(), days_before) {
                        ("unseal", _) => NotificationKind::Unseal,
                        ("reminder", Some(days_before)) => {
                            NotificationKind::Reminder { days_before }
                        }
                        (other, _) => {
                            return Err(Error::internal(format!(
                                "unknown notification kind '{other}' for {id}"
                            )))
                        }
                    };
                    Ok(ScheduledNotification {
                        id,
                        capsule_id,
                        kind,
                        title,
                        body,
                        fire_at,
                    })
                })
                .collect()
        })
    }
}

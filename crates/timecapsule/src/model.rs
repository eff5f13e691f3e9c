//! Core domain types for timecapsule.
//!
//! Users, capsules, clips and scheduled notifications as they move between
//! the services and the storage backends.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::unseal::{seal_state, SealState};

/// Current time at the precision the stores persist (microseconds).
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// A signed-up user, owned by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable user id.
    pub id: String,
    /// Name shown to other members.
    pub display_name: String,
    /// Lower-cased email address.
    pub email: String,
}

/// A named, dated collection of clips, locked until `unlock_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capsule {
    /// Capsule id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// User who created the capsule.
    pub creator_id: String,
    /// Members in join order; the creator is always first.
    pub member_ids: Vec<String>,
    /// When the contents become visible.
    pub unlock_at: DateTime<Utc>,
    /// Persisted cache of `now >= unlock_at`, set once by the unseal sweep.
    pub unsealed: bool,
    /// When the sweep flipped `unsealed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsealed_at: Option<DateTime<Utc>>,
    /// Six-digit code other users can join with.
    pub share_code: String,
    /// When the capsule was created.
    pub created_at: DateTime<Utc>,
}

impl Capsule {
    /// Create a new sealed capsule with the creator as its only member.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        creator_id: impl Into<String>,
        unlock_at: DateTime<Utc>,
        share_code: impl Into<String>,
    ) -> Self {
        let creator_id = creator_id.into();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            member_ids: vec![creator_id.clone()],
            creator_id,
            unlock_at: unlock_at.trunc_subsecs(6),
            unsealed: false,
            unsealed_at: None,
            share_code: share_code.into(),
            created_at: now(),
        }
    }

    /// Visibility of the contents at `now`.
    ///
    /// A capsule whose flag has not been flipped yet still reads as unsealed
    /// once its unlock time has passed.
    #[must_use]
    pub fn state_at(&self, now: DateTime<Utc>) -> SealState {
        if self.unsealed {
            SealState::Unsealed
        } else {
            seal_state(self.unlock_at, now)
        }
    }

    /// Check whether `user_id` is a member.
    #[must_use]
    pub fn is_member(&self, user_id: &str) -> bool {
        self.member_ids.iter().any(|m| m == user_id)
    }
}

/// A single uploaded video in a capsule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clip {
    /// Clip id.
    pub id: String,
    /// Capsule the clip belongs to.
    pub capsule_id: String,
    /// User who uploaded the clip.
    pub uploader_id: String,
    /// Uploader's display name at upload time.
    pub uploader_name: String,
    /// Object store path of the video.
    pub storage_path: String,
    /// When the video was originally recorded. Playback is ordered by this.
    pub recorded_at: DateTime<Utc>,
    /// When the video was uploaded.
    pub uploaded_at: DateTime<Utc>,
    /// Video length in milliseconds, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// BLAKE3 hash of the uploaded bytes.
    pub content_hash: String,
}

/// What a scheduled local notification announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum NotificationKind {
    /// The capsule has unsealed.
    Unseal,
    /// The capsule unseals in `days_before` days.
    Reminder {
        /// Days between the notification and the unlock date.
        days_before: u32,
    },
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unseal => write!(f, "unseal"),
            Self::Reminder { days_before } => write!(f, "reminder ({days_before}d)"),
        }
    }
}

/// A local notification queued for a future time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledNotification {
    /// Notification id; scheduling the same id again replaces it.
    pub id: String,
    /// Capsule the notification is about.
    pub capsule_id: String,
    /// Kind of notification.
    #[serde(flatten)]
    pub kind: NotificationKind,
    /// Title line.
    pub title: String,
    /// Body text.
    pub body: String,
    /// When to deliver.
    pub fire_at: DateTime<Utc>,
}

impl ScheduledNotification {
    /// Notification announcing that `capsule` is ready to watch.
    #[must_use]
    pub fn unseal(capsule: &Capsule, fire_at: DateTime<Utc>) -> Self {
        Self {
            id: format!("capsule_{}", capsule.id),
            capsule_id: capsule.id.clone(),
            kind: NotificationKind::Unseal,
            title: "Time Capsule Unsealed!".to_string(),
            body: format!("Your capsule '{}' is now ready to view!", capsule.name),
            fire_at,
        }
    }

    /// Reminder `days_before` days ahead of the unlock date.
    #[must_use]
    pub fn reminder(capsule: &Capsule, days_before: u32) -> Self {
        let plural = if days_before == 1 { "" } else { "s" };
        Self {
            id: format!("reminder_{}_{days_before}", capsule.id),
            capsule_id: capsule.id.clone(),
            kind: NotificationKind::Reminder { days_before },
            title: "Time Capsule Reminder".to_string(),
            body: format!(
                "Your capsule '{}' unseals in {days_before} day{plural}!",
                capsule.name
            ),
            fire_at: capsule.unlock_at - chrono::Duration::days(i64::from(days_before)),
        }
    }
}

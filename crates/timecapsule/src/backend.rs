//! Seams to the external collaborators.
//!
//! The app runs against an authentication provider, a document store, an
//! object store and a local notification scheduler. Each one is a trait so
//! the services can be wired to a managed backend or to the local
//! implementations in [`crate::storage`] and [`crate::objects`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Capsule, Clip, ScheduledNotification, User};

/// Sign-up, sign-in and current-session queries.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Create an account and start a session for it.
    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<User>;

    /// Start a session for an existing account.
    async fn sign_in(&self, email: &str, password: &str) -> Result<User>;

    /// End the current session. Signing out with no session is not an error.
    async fn sign_out(&self) -> Result<()>;

    /// The signed-in user, if any.
    async fn current_session(&self) -> Result<Option<User>>;
}

/// Document store for capsules, memberships and clip records.
#[async_trait]
pub trait CapsuleStore: Send + Sync {
    /// Persist a new capsule together with its initial members.
    async fn create_capsule(&self, capsule: &Capsule) -> Result<()>;

    /// Fetch a capsule by id.
    async fn get_capsule(&self, id: &str) -> Result<Option<Capsule>>;

    /// All capsules `user_id` is a member of, soonest unlock first with ties
    /// broken by id.
    async fn capsules_for_member(&self, user_id: &str) -> Result<Vec<Capsule>>;

    /// Look up a capsule by its share code.
    async fn find_by_share_code(&self, code: &str) -> Result<Option<Capsule>>;

    /// Array-union `user_id` into the members.
    ///
    /// Returns `true` if the user was newly added.
    async fn add_member(&self, capsule_id: &str, user_id: &str) -> Result<bool>;

    /// Array-remove `user_id` from the members.
    ///
    /// Returns `true` if the user was a member.
    async fn remove_member(&self, capsule_id: &str, user_id: &str) -> Result<bool>;

    /// Capsules still flagged sealed whose unlock time is at or before `now`.
    async fn due_for_unseal(&self, now: DateTime<Utc>) -> Result<Vec<Capsule>>;

    /// Set the unsealed flag only if it is still clear.
    ///
    /// Returns `true` if this call performed the flip. The flag is never
    /// cleared again.
    async fn mark_unsealed_if_sealed(&self, capsule_id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Record an uploaded clip.
    async fn add_clip(&self, clip: &Clip) -> Result<()>;

    /// All clip records of a capsule, in no particular order.
    async fn clips_for_capsule(&self, capsule_id: &str) -> Result<Vec<Clip>>;
}

/// User lookups used by invites.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Find a user by (lower-cased) email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Fetch a user by id.
    async fn get_user(&self, id: &str) -> Result<Option<User>>;
}

/// A file accepted by an [`ObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Path relative to the store root.
    pub path: String,
    /// Retrievable URL.
    pub url: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME type recorded at upload.
    pub content_type: String,
    /// BLAKE3 hash of the contents.
    pub content_hash: String,
}

/// Blob storage for uploaded videos.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `path`.
    async fn upload(&self, path: &str, data: Vec<u8>, content_type: &str) -> Result<StoredObject>;

    /// Retrievable URL for an existing object.
    async fn url(&self, path: &str) -> Result<String>;

    /// Remove an object. Returns `true` if it existed.
    async fn delete(&self, path: &str) -> Result<bool>;
}

/// Local notification scheduling.
#[async_trait]
pub trait NotificationScheduler: Send + Sync {
    /// Queue a notification; an existing one with the same id is replaced.
    async fn schedule(&self, notification: &ScheduledNotification) -> Result<()>;

    /// Cancel a pending notification. Returns `true` if one was removed.
    async fn cancel(&self, id: &str) -> Result<bool>;

    /// All pending notifications ordered by fire time.
    async fn pending(&self) -> Result<Vec<ScheduledNotification>>;
}

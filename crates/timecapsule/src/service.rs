//! Capsule operations for the signed-in user.
//!
//! [`CapsuleService`] ties the seal rule, clip ordering and invite helpers
//! to the collaborators in [`Backends`]. Every operation acts on behalf of
//! the current session and fails with [`Error::NotAuthenticated`] when
//! nobody is signed in.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::backend::{AuthProvider, CapsuleStore, NotificationScheduler, ObjectStore, UserDirectory};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{CapsuleEvent, EventBus};
use crate::model::{Capsule, Clip, ScheduledNotification, User};
use crate::objects::LocalObjectStore;
use crate::ordering::order_for_playback;
use crate::sharing::{
    generate_share_code, parse_emails, partition_invites, share_link, share_message,
    InviteOutcome,
};
use crate::storage::Storage;
use crate::unseal::{Countdown, SealState, UnsealSweeper};

/// Attempts at drawing a share code no other capsule uses.
const SHARE_CODE_ATTEMPTS: usize = 5;

/// Handles to the external collaborators.
#[derive(Clone)]
pub struct Backends {
    /// Authentication provider.
    pub auth: Arc<dyn AuthProvider>,
    /// Capsule document store.
    pub store: Arc<dyn CapsuleStore>,
    /// User lookups.
    pub directory: Arc<dyn UserDirectory>,
    /// Video blob storage.
    pub objects: Arc<dyn ObjectStore>,
    /// Local notification scheduler.
    pub notifier: Arc<dyn NotificationScheduler>,
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

impl Backends {
    /// Wire every collaborator to local storage.
    #[must_use]
    pub fn from_storage(storage: Arc<Storage>, objects: LocalObjectStore) -> Self {
        Self {
            auth: storage.clone(),
            store: storage.clone(),
            directory: storage.clone(),
            objects: Arc::new(objects),
            notifier: storage,
        }
    }

    /// Open the local database and object store named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn local(config: &Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(config.database_path())?);
        let objects = LocalObjectStore::new(config.objects_dir())?;
        Ok(Self::from_storage(storage, objects))
    }
}

/// A capsule together with its state as seen now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapsuleView {
    /// The capsule record.
    #[serde(flatten)]
    pub capsule: Capsule,
    /// Visibility at the time of the query.
    pub state: SealState,
    /// Countdown text, or "Unsealed".
    pub countdown: String,
    /// Number of clips contributed so far.
    pub clip_count: usize,
}

/// A clip ready to play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackItem {
    /// The clip record.
    #[serde(flatten)]
    pub clip: Clip,
    /// Where to fetch the video.
    pub url: String,
}

/// Result of inviting a list of addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InviteReport {
    /// How the valid addresses were handled.
    pub outcome: InviteOutcome,
    /// Tokens that were not valid addresses.
    pub rejected: Vec<String>,
    /// Addresses whose membership could not be saved. Inviting them again
    /// is safe.
    pub failed: Vec<String>,
}

/// Everything needed to invite someone out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareInvite {
    /// Deep link to the capsule.
    pub link: Url,
    /// Six-digit join code.
    pub code: String,
    /// Ready-to-send invite text.
    pub message: String,
}

/// Capsule operations on behalf of the current session.
pub struct CapsuleService {
    backends: Backends,
    events: EventBus,
    clock: Arc<dyn Clock>,
    reminder_days: Vec<u32>,
    share_base_url: String,
}

impl std::fmt::Debug for CapsuleService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapsuleService")
            .field("clock", &self.clock)
            .field("reminder_days", &self.reminder_days)
            .field("share_base_url", &self.share_base_url)
            .finish_non_exhaustive()
    }
}

impl CapsuleService {
    /// Create a service over `backends`, publishing to `events`.
    #[must_use]
    pub fn new(backends: Backends, events: EventBus, config: &Config) -> Self {
        Self {
            backends,
            events,
            clock: Arc::new(SystemClock),
            reminder_days: config.unseal.reminder_days.clone(),
            share_base_url: config.sharing.share_base_url.clone(),
        }
    }

    /// Use `clock` for every notion of now.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The bus this service publishes to.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The collaborators this service runs against.
    #[must_use]
    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    /// An unseal sweeper sharing this service's store, bus and clock.
    #[must_use]
    pub fn sweeper(&self, config: &Config) -> UnsealSweeper {
        let sweeper = UnsealSweeper::new(
            self.backends.store.clone(),
            self.events.clone(),
            config.sweep_interval(),
        )
        .with_clock(self.clock.clone());

        if config.unseal.notify_on_unseal {
            sweeper.with_notifier(self.backends.notifier.clone())
        } else {
            sweeper
        }
    }

    /// The signed-in user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAuthenticated`] when nobody is signed in.
    pub async fn current_user(&self) -> Result<User> {
        self.backends
            .auth
            .current_session()
            .await?
            .ok_or(Error::NotAuthenticated)
    }

    /// Create a capsule unlocking at `unlock_at` with the current user as its
    /// only member.
    ///
    /// Schedules the unseal notification and whichever reminders still lie
    /// in the future.
    ///
    /// # Errors
    ///
    /// Returns an error if nobody is signed in, the name is blank, the unlock
    /// date is not in the future, or the store fails.
    pub async fn create_capsule(&self, name: &str, unlock_at: DateTime<Utc>) -> Result<Capsule> {
        let user = self.current_user().await?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("capsule name must not be empty"));
        }
        let now = self.clock.now();
        if unlock_at <= now {
            return Err(Error::validation("unlock date must be in the future"));
        }

        let share_code = self.unused_share_code().await?;
        let capsule = Capsule::new(name, &user.id, unlock_at, share_code);
        self.backends.store.create_capsule(&capsule).await?;

        self.schedule(&ScheduledNotification::unseal(&capsule, capsule.unlock_at))
            .await;
        for &days in &self.reminder_days {
            let reminder = ScheduledNotification::reminder(&capsule, days);
            if reminder.fire_at > now {
                self.schedule(&reminder).await;
            }
        }

        self.events.publish(CapsuleEvent::CapsuleCreated {
            capsule_id: capsule.id.clone(),
            name: capsule.name.clone(),
            unlock_at: capsule.unlock_at,
        });
        info!("Created capsule '{}' unlocking at {}", capsule.name, capsule.unlock_at);
        Ok(capsule)
    }

    /// Join the capsule with share code `code`.
    ///
    /// # Errors
    ///
    /// Returns an error if nobody is signed in or no capsule uses the code.
    pub async fn join_by_share_code(&self, code: &str) -> Result<Capsule> {
        let user = self.current_user().await?;
        let code = code.trim();
        let mut capsule = self
            .backends
            .store
            .find_by_share_code(code)
            .await?
            .ok_or_else(|| Error::ShareCodeNotFound {
                code: code.to_string(),
            })?;

        if self.backends.store.add_member(&capsule.id, &user.id).await? {
            capsule.member_ids.push(user.id.clone());
            self.events.publish(CapsuleEvent::MemberJoined {
                capsule_id: capsule.id.clone(),
                user_id: user.id,
            });
            info!("Joined capsule '{}'", capsule.name);
        } else {
            debug!("Already a member of capsule {}", capsule.id);
        }
        Ok(capsule)
    }

    /// Invite every address in `raw_emails` that belongs to a user.
    ///
    /// Each invitee is added on its own. One that cannot be saved is listed in
    /// [`InviteReport::failed`] and does not undo the others.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not a member or no address in the
    /// input is valid.
    pub async fn invite(&self, capsule_id: &str, raw_emails: &str) -> Result<InviteReport> {
        let user = self.current_user().await?;
        let capsule = self.member_capsule(capsule_id, &user).await?;

        let parsed = parse_emails(raw_emails);
        if parsed.valid.is_empty() {
            return Err(Error::NoValidEmails);
        }

        let mut outcome =
            partition_invites(&parsed.valid, &capsule, self.backends.directory.as_ref()).await;
        let mut invited = Vec::with_capacity(outcome.invited.len());
        let mut failed = Vec::new();
        for invitee in std::mem::take(&mut outcome.invited) {
            match self
                .backends
                .store
                .add_member(&capsule.id, &invitee.user_id)
                .await
            {
                Ok(true) => {
                    self.events.publish(CapsuleEvent::MemberJoined {
                        capsule_id: capsule.id.clone(),
                        user_id: invitee.user_id.clone(),
                    });
                    invited.push(invitee);
                }
                Ok(false) => outcome.already_members.push(invitee.email),
                Err(e) => {
                    warn!("Failed to add {} to {}: {}", invitee.email, capsule.id, e);
                    failed.push(invitee.email);
                }
            }
        }
        outcome.invited = invited;

        info!(
            "Invited {} to '{}' ({} already members, {} not found, {} failed)",
            outcome.invited.len(),
            capsule.name,
            outcome.already_members.len(),
            outcome.not_found.len(),
            failed.len()
        );
        Ok(InviteReport {
            outcome,
            rejected: parsed.rejected,
            failed,
        })
    }

    /// Add an existing user to a capsule the caller belongs to.
    ///
    /// Returns `true` if the user was newly added.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not a member or the user does not exist.
    pub async fn add_member(&self, capsule_id: &str, user_id: &str) -> Result<bool> {
        let user = self.current_user().await?;
        let capsule = self.member_capsule(capsule_id, &user).await?;

        if self.backends.directory.get_user(user_id).await?.is_none() {
            return Err(Error::validation(format!("no user with id {user_id}")));
        }

        let added = self.backends.store.add_member(&capsule.id, user_id).await?;
        if added {
            self.events.publish(CapsuleEvent::MemberJoined {
                capsule_id: capsule.id,
                user_id: user_id.to_string(),
            });
        }
        Ok(added)
    }

    /// Remove a member. The creator may remove anyone but themselves; other
    /// members may only remove themselves.
    ///
    /// Returns `true` if the user was a member.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not a member or the removal is not allowed.
    pub async fn remove_member(&self, capsule_id: &str, user_id: &str) -> Result<bool> {
        let user = self.current_user().await?;
        let capsule = self.member_capsule(capsule_id, &user).await?;

        if user_id == capsule.creator_id {
            return Err(Error::forbidden("the capsule creator cannot be removed"));
        }
        if user.id != capsule.creator_id && user.id != user_id {
            return Err(Error::forbidden(
                "only the capsule creator can remove other members",
            ));
        }

        let removed = self.backends.store.remove_member(&capsule.id, user_id).await?;
        if removed {
            self.events.publish(CapsuleEvent::MemberRemoved {
                capsule_id: capsule.id,
                user_id: user_id.to_string(),
            });
        }
        Ok(removed)
    }

    /// Capsules the current user belongs to, soonest unlock first.
    ///
    /// # Errors
    ///
    /// Returns an error if nobody is signed in or the store fails.
    pub async fn capsules_for_current_user(&self) -> Result<Vec<CapsuleView>> {
        let user = self.current_user().await?;
        let now = self.clock.now();

        let capsules = self.backends.store.capsules_for_member(&user.id).await?;
        let mut views = Vec::with_capacity(capsules.len());
        for capsule in capsules {
            views.push(self.view(capsule, now).await?);
        }
        Ok(views)
    }

    /// A capsule the current user belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if the capsule does not exist or the caller is not a member.
    pub async fn get_capsule(&self, capsule_id: &str) -> Result<CapsuleView> {
        let user = self.current_user().await?;
        let capsule = self.member_capsule(capsule_id, &user).await?;
        self.view(capsule, self.clock.now()).await
    }

    /// Upload a video file into a capsule.
    ///
    /// The recording time is `recorded_at` if given, else the file's creation
    /// time, else its modification time, else now.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not a member, the file is empty or
    /// not a supported video, or the same video is already in the capsule.
    /// The stored object is removed again if the clip cannot be recorded.
    pub async fn upload_clip(
        &self,
        capsule_id: &str,
        file: &Path,
        recorded_at: Option<DateTime<Utc>>,
        duration_ms: Option<u64>,
    ) -> Result<Clip> {
        let user = self.current_user().await?;
        let capsule = self.member_capsule(capsule_id, &user).await?;

        let (extension, content_type) = video_type(file)?;
        let data = tokio::fs::read(file).await?;
        if data.is_empty() {
            return Err(Error::clip_processing(format!(
                "{} is empty",
                file.display()
            )));
        }

        let hash = blake3::hash(&data).to_hex().to_string();
        let existing = self.backends.store.clips_for_capsule(&capsule.id).await?;
        if let Some(dup) = existing.iter().find(|c| c.content_hash == hash) {
            return Err(Error::DuplicateClip {
                clip_id: dup.id.clone(),
            });
        }

        let metadata = tokio::fs::metadata(file).await.ok();
        let now = self.clock.now();
        let recorded_at = resolve_recorded_at(recorded_at, metadata.as_ref(), now);

        let clip_id = Uuid::new_v4().to_string();
        let path = format!("capsules/{}/videos/{clip_id}.{extension}", capsule.id);
        let stored = self
            .backends
            .objects
            .upload(&path, data, content_type)
            .await?;

        let clip = Clip {
            id: clip_id,
            capsule_id: capsule.id.clone(),
            uploader_id: user.id,
            uploader_name: user.display_name,
            storage_path: stored.path,
            recorded_at,
            uploaded_at: now,
            duration_ms,
            content_hash: stored.content_hash,
        };
        if let Err(e) = self.backends.store.add_clip(&clip).await {
            if let Err(cleanup) = self.backends.objects.delete(&clip.storage_path).await {
                warn!("Failed to remove orphaned object {}: {}", clip.storage_path, cleanup);
            }
            return Err(e);
        }

        self.events.publish(CapsuleEvent::ClipAdded {
            capsule_id: capsule.id,
            clip_id: clip.id.clone(),
            recorded_at: clip.recorded_at,
        });
        info!("Uploaded clip {} ({} bytes)", clip.id, stored.size);
        Ok(clip)
    }

    /// The capsule's clips in playback order, with URLs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapsuleSealed`] before the unlock time, or an error if
    /// the caller is not a member.
    pub async fn playback(&self, capsule_id: &str) -> Result<Vec<PlaybackItem>> {
        let user = self.current_user().await?;
        let capsule = self.member_capsule(capsule_id, &user).await?;

        if capsule.state_at(self.clock.now()) == SealState::Sealed {
            return Err(Error::CapsuleSealed {
                capsule_id: capsule.id,
                unlock_at: capsule.unlock_at,
            });
        }

        let clips = order_for_playback(self.backends.store.clips_for_capsule(&capsule.id).await?);
        let mut items = Vec::with_capacity(clips.len());
        for clip in clips {
            let url = self.backends.objects.url(&clip.storage_path).await?;
            items.push(PlaybackItem { clip, url });
        }
        Ok(items)
    }

    /// Share link, code and invite text for a capsule.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not a member or the base URL is invalid.
    pub async fn share(&self, capsule_id: &str) -> Result<ShareInvite> {
        let user = self.current_user().await?;
        let capsule = self.member_capsule(capsule_id, &user).await?;

        let link = share_link(&self.share_base_url, &capsule)?;
        let message = share_message(&capsule, Some(user.display_name.as_str()), &link);
        Ok(ShareInvite {
            link,
            code: capsule.share_code,
            message,
        })
    }

    async fn member_capsule(&self, capsule_id: &str, user: &User) -> Result<Capsule> {
        let capsule = self
            .backends
            .store
            .get_capsule(capsule_id)
            .await?
            .ok_or_else(|| Error::CapsuleNotFound {
                id: capsule_id.to_string(),
            })?;
        if !capsule.is_member(&user.id) {
            return Err(Error::NotAMember {
                capsule_id: capsule.id,
            });
        }
        Ok(capsule)
    }

    async fn view(&self, capsule: Capsule, now: DateTime<Utc>) -> Result<CapsuleView> {
        let clip_count = self.backends.store.clips_for_capsule(&capsule.id).await?.len();
        Ok(CapsuleView {
            state: capsule.state_at(now),
            countdown: Countdown::label(capsule.unlock_at, now),
            clip_count,
            capsule,
        })
    }

    async fn unused_share_code(&self) -> Result<String> {
        for _ in 0..SHARE_CODE_ATTEMPTS {
            let code = generate_share_code();
            if self.backends.store.find_by_share_code(&code).await?.is_none() {
                return Ok(code);
            }
        }
        Err(Error::internal("could not allocate an unused share code"))
    }

    async fn schedule(&self, notification: &ScheduledNotification) {
        if let Err(e) = self.backends.notifier.schedule(notification).await {
            warn!("Failed to schedule notification {}: {}", notification.id, e);
        }
    }
}

/// File extension and MIME type of a supported video file.
fn video_type(file: &Path) -> Result<(String, &'static str)> {
    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let content_type = match extension.as_str() {
        "mov" => "video/quicktime",
        "mp4" => "video/mp4",
        "m4v" => "video/x-m4v",
        _ => {
            return Err(Error::clip_processing(format!(
                "{} is not a supported video (mov, mp4, m4v)",
                file.display()
            )))
        }
    };
    Ok((extension, content_type))
}

/// Pick the recording time for an uploaded file.
fn resolve_recorded_at(
    explicit: Option<DateTime<Utc>>,
    metadata: Option<&std::fs::Metadata>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    explicit
        .or_else(|| {
            metadata.and_then(|m| {
                m.created()
                    .or_else(|_| m.modified())
                    .ok()
                    .map(DateTime::<Utc>::from)
            })
        })
        .unwrap_or(now)
        .trunc_subsecs(6)
}

//! `SQLite` schema definitions for timecapsule.
//!
//! Timestamps are stored as INTEGER microseconds since the Unix epoch, so
//! every comparison in SQL is numeric.

/// SQL statement to create the users table.
pub const CREATE_USERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL
)
";

/// SQL statement to create the single-row session table.
pub const CREATE_SESSION_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS session (
    slot INTEGER PRIMARY KEY CHECK (slot = 1),
    user_id TEXT NOT NULL REFERENCES users(id),
    signed_in_at INTEGER NOT NULL
)
";

/// SQL statement to create the capsules table.
pub const CREATE_CAPSULES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS capsules (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    creator_id TEXT NOT NULL,
    unlock_at INTEGER NOT NULL,
    unsealed INTEGER NOT NULL DEFAULT 0,
    unsealed_at INTEGER,
    share_code TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL
)
";

/// SQL statement to create an index serving the unseal sweep query.
pub const CREATE_UNSEAL_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_capsules_unseal ON capsules(unsealed, unlock_at)
";

/// SQL statement to create the membership table.
pub const CREATE_MEMBERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS capsule_members (
    capsule_id TEXT NOT NULL REFERENCES capsules(id),
    user_id TEXT NOT NULL,
    PRIMARY KEY (capsule_id, user_id)
)
";

/// SQL statement to create an index for membership lookups by user.
pub const CREATE_MEMBER_USER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_members_user ON capsule_members(user_id)
";

/// SQL statement to create the clips table.
pub const CREATE_CLIPS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS clips (
    id TEXT PRIMARY KEY,
    capsule_id TEXT NOT NULL REFERENCES capsules(id),
    uploader_id TEXT NOT NULL,
    uploader_name TEXT NOT NULL,
    storage_path TEXT NOT NULL,
    recorded_at INTEGER NOT NULL,
    uploaded_at INTEGER NOT NULL,
    duration_ms INTEGER,
    content_hash TEXT NOT NULL,
    UNIQUE (capsule_id, content_hash)
)
";

/// SQL statement to create an index on clips by capsule and recording time.
pub const CREATE_CLIPS_CAPSULE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_clips_capsule ON clips(capsule_id, recorded_at)
";

/// SQL statement to create the pending notifications table.
pub const CREATE_NOTIFICATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY,
    capsule_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    days_before INTEGER,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    fire_at INTEGER NOT NULL
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_USERS_TABLE,
    CREATE_SESSION_TABLE,
    CREATE_CAPSULES_TABLE,
    CREATE_UNSEAL_INDEX,
    CREATE_MEMBERS_TABLE,
    CREATE_MEMBER_USER_INDEX,
    CREATE_CLIPS_TABLE,
    CREATE_CLIPS_CAPSULE_INDEX,
    CREATE_NOTIFICATIONS_TABLE,
    CREATE_METADATA_TABLE,
];

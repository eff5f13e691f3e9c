//! Error types for timecapsule.
//!
//! Every error belongs to an [`ErrorCategory`], which carries the
//! human-readable title and the recovery suggestion shown to the user.
//! Failures are terminal for the action that triggered them; nothing in this
//! crate retries automatically.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// The main error type for timecapsule operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An object was requested from the object store but does not exist.
    #[error("stored object not found: {path}")]
    ObjectNotFound {
        /// Object path relative to the store root.
        path: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Authentication Errors ===
    /// The operation needs a signed-in user.
    #[error("you must be signed in to perform this action")]
    NotAuthenticated,

    /// Email or password did not match.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// An account already exists for this email.
    #[error("an account already exists for {email}")]
    EmailTaken {
        /// The normalized email address.
        email: String,
    },

    /// Password hashing or verification failed internally.
    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    // === Network Errors ===
    /// A remote collaborator could not be reached.
    #[error("network request failed: {message}")]
    Network {
        /// Description of what went wrong.
        message: String,
    },

    // === Validation Errors ===
    /// User input was rejected.
    #[error("{message}")]
    Validation {
        /// Description of the rejected input.
        message: String,
    },

    /// None of the supplied addresses looked like an email.
    #[error("no valid email addresses were supplied")]
    NoValidEmails,

    /// No capsule exists with the given id.
    #[error("capsule not found: {id}")]
    CapsuleNotFound {
        /// The capsule id.
        id: String,
    },

    /// No capsule uses the given share code.
    #[error("no capsule found with share code {code}")]
    ShareCodeNotFound {
        /// The share code that was looked up.
        code: String,
    },

    /// The same video was already contributed to this capsule.
    #[error("this video was already added to the capsule as clip {clip_id}")]
    DuplicateClip {
        /// Id of the existing clip.
        clip_id: String,
    },

    /// A share link could not be built.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // === Permission Errors ===
    /// The current user is not a member of the capsule.
    #[error("you are not a member of capsule {capsule_id}")]
    NotAMember {
        /// The capsule id.
        capsule_id: String,
    },

    /// The capsule contents are still locked.
    #[error("capsule {capsule_id} stays sealed until {unlock_at}")]
    CapsuleSealed {
        /// The capsule id.
        capsule_id: String,
        /// When the capsule unlocks.
        unlock_at: DateTime<Utc>,
    },

    /// The user is not allowed to change this membership.
    #[error("not allowed: {reason}")]
    Forbidden {
        /// Why the change was refused.
        reason: String,
    },

    // === Processing Errors ===
    /// A video file could not be read or is unsupported.
    #[error("video processing failed: {message}")]
    ClipProcessing {
        /// Description of what went wrong.
        message: String,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for timecapsule operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

/// Broad classes of failure surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Sign-in or session problems.
    Authentication,
    /// A remote service was unreachable.
    Network,
    /// Local database or file storage problems.
    Storage,
    /// Input was rejected.
    Validation,
    /// The user may not perform the action.
    Permission,
    /// A video could not be processed.
    Processing,
    /// Anything else.
    Unknown,
}

impl ErrorCategory {
    /// Short title shown above the error message.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Authentication => "Authentication Error",
            Self::Network => "Network Error",
            Self::Storage => "Storage Error",
            Self::Validation => "Validation Error",
            Self::Permission => "Permission Error",
            Self::Processing => "Video Processing Error",
            Self::Unknown => "Unexpected Error",
        }
    }

    /// Generic suggestion for how the user can recover.
    #[must_use]
    pub fn recovery_suggestion(self) -> &'static str {
        match self {
            Self::Authentication => "Please try signing in again",
            Self::Network => "Check your internet connection and try again",
            Self::Storage => "Check your device storage and try again",
            Self::Validation => "Please check your input and try again",
            Self::Permission => "Please grant the necessary permissions in Settings",
            Self::Processing => "Try recording a new video",
            Self::Unknown => "Please try again or contact support",
        }
    }

    /// Stable code used in log lines.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Authentication => "AUTH_ERROR",
            Self::Network => "NETWORK_ERROR",
            Self::Storage => "STORAGE_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::Permission => "PERMISSION_ERROR",
            Self::Processing => "VIDEO_ERROR",
            Self::Unknown => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl Error {
    /// Create a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a new network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new clip processing error.
    #[must_use]
    pub fn clip_processing(message: impl Into<String>) -> Self {
        Self::ClipProcessing {
            message: message.into(),
        }
    }

    /// Create a forbidden-membership-change error.
    #[must_use]
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    /// The category this error is reported under.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotAuthenticated
            | Self::InvalidCredentials
            | Self::EmailTaken { .. }
            | Self::PasswordHash(_) => ErrorCategory::Authentication,
            Self::Network { .. } => ErrorCategory::Network,
            Self::DatabaseOpen { .. }
            | Self::DatabaseQuery(_)
            | Self::DatabaseMigration { .. }
            | Self::Io(_)
            | Self::DirectoryCreate { .. }
            | Self::ObjectNotFound { .. } => ErrorCategory::Storage,
            Self::ConfigValidation { .. }
            | Self::Validation { .. }
            | Self::NoValidEmails
            | Self::CapsuleNotFound { .. }
            | Self::ShareCodeNotFound { .. }
            | Self::DuplicateClip { .. }
            | Self::InvalidUrl(_) => ErrorCategory::Validation,
            Self::NotAMember { .. } | Self::CapsuleSealed { .. } | Self::Forbidden { .. } => {
                ErrorCategory::Permission
            }
            Self::ClipProcessing { .. } => ErrorCategory::Processing,
            Self::ConfigLoad(_) | Self::Json(_) | Self::Internal(_) => ErrorCategory::Unknown,
        }
    }

    /// Message for the user: category title followed by the error text.
    #[must_use]
    pub fn user_message(&self) -> String {
        format!("{}: {self}", self.category().title())
    }

    /// Recovery suggestion for this error's category.
    #[must_use]
    pub fn recovery_suggestion(&self) -> &'static str {
        self.category().recovery_suggestion()
    }

    /// Check if this error means nobody is signed in.
    #[must_use]
    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, Self::NotAuthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotAuthenticated;
        assert_eq!(
            err.to_string(),
            "you must be signed in to perform this action"
        );

        let err = Error::internal("test error");
        assert_eq!(err.to_string(), "internal error: test error");
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::InvalidCredentials.category(),
            ErrorCategory::Authentication
        );
        assert_eq!(Error::network("offline").category(), ErrorCategory::Network);
        assert_eq!(
            Error::ObjectNotFound {
                path: "a".to_string()
            }
            .category(),
            ErrorCategory::Storage
        );
        assert_eq!(Error::NoValidEmails.category(), ErrorCategory::Validation);
        assert_eq!(
            Error::NotAMember {
                capsule_id: "c".to_string()
            }
            .category(),
            ErrorCategory::Permission
        );
        assert_eq!(
            Error::clip_processing("empty file").category(),
            ErrorCategory::Processing
        );
        assert_eq!(Error::internal("x").category(), ErrorCategory::Unknown);
    }

    #[test]
    fn test_user_message_includes_title() {
        let err = Error::validation("capsule name cannot be empty");
        assert_eq!(
            err.user_message(),
            "Validation Error: capsule name cannot be empty"
        );
        assert_eq!(
            err.recovery_suggestion(),
            "Please check your input and try again"
        );
    }

    #[test]
    fn test_network_recovery_suggestion() {
        let err = Error::network("timeout");
        assert_eq!(
            err.recovery_suggestion(),
            "Check your internet connection and try again"
        );
    }

    #[test]
    fn test_category_codes_unique() {
        let all = [
            ErrorCategory::Authentication,
            ErrorCategory::Network,
            ErrorCategory::Storage,
            ErrorCategory::Validation,
            ErrorCategory::Permission,
            ErrorCategory::Processing,
            ErrorCategory::Unknown,
        ];
        let codes: std::collections::HashSet<_> = all.iter().map(|c| c.code()).collect();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn test_category_display_is_title() {
        assert_eq!(ErrorCategory::Processing.to_string(), "Video Processing Error");
    }

    #[test]
    fn test_is_not_authenticated() {
        assert!(Error::NotAuthenticated.is_not_authenticated());
        assert!(!Error::InvalidCredentials.is_not_authenticated());
    }

    #[test]
    fn test_capsule_sealed_display() {
        let unlock_at = DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let err = Error::CapsuleSealed {
            capsule_id: "abc".to_string(),
            unlock_at,
        };
        let msg = err.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("2030-01-01"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
        assert_eq!(err.category(), ErrorCategory::Storage);
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_from_url_error() {
        let err: Error = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, Error::InvalidUrl(_)));
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_database_migration_error_display() {
        let err = Error::DatabaseMigration {
            message: "version mismatch".to_string(),
        };
        assert!(err.to_string().contains("version mismatch"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }
}

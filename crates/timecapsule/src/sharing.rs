//! Email validation, invite partitioning and share links.

use std::collections::HashSet;
use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;
use serde::Serialize;
use tracing::warn;
use url::Url;

use crate::backend::UserDirectory;
use crate::error::Result;
use crate::model::Capsule;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z0-9a-z._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,64}$").expect("valid email regex")
});

/// Check an address against the standard email syntax.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// Result of splitting raw invite input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedEmails {
    /// Valid addresses, lower-cased, in first-seen order without duplicates.
    pub valid: Vec<String>,
    /// Non-empty tokens that failed validation, as entered.
    pub rejected: Vec<String>,
}

/// Split comma, semicolon or line separated input into email addresses.
#[must_use]
pub fn parse_emails(raw: &str) -> ParsedEmails {
    let mut parsed = ParsedEmails::default();
    let mut seen = HashSet::new();

    for token in raw.split([',', ';', '\n', '\r']) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if !is_valid_email(token) {
            parsed.rejected.push(token.to_string());
            continue;
        }
        let email = token.to_lowercase();
        if seen.insert(email.clone()) {
            parsed.valid.push(email);
        }
    }

    parsed
}

/// A user found for an invited address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invitee {
    /// Address as invited.
    pub email: String,
    /// Matching user.
    pub user_id: String,
}

/// How an invite attempt splits across the directory.
///
/// The three buckets are disjoint and together hold every input address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InviteOutcome {
    /// Users to add to the capsule.
    pub invited: Vec<Invitee>,
    /// Addresses of users already in the capsule.
    pub already_members: Vec<String>,
    /// Addresses with no account.
    pub not_found: Vec<String>,
}

impl InviteOutcome {
    /// Total number of addresses considered.
    #[must_use]
    pub fn total(&self) -> usize {
        self.invited.len() + self.already_members.len() + self.not_found.len()
    }
}

/// Sort `emails` into invited, already-member and not-found buckets.
///
/// A failed lookup counts as not found.
pub async fn partition_invites(
    emails: &[String],
    capsule: &Capsule,
    directory: &dyn UserDirectory,
) -> InviteOutcome {
    let mut outcome = InviteOutcome::default();

    for email in emails {
        match directory.find_by_email(email).await {
            Ok(Some(user)) if capsule.is_member(&user.id) => {
                outcome.already_members.push(email.clone());
            }
            Ok(Some(user)) => outcome.invited.push(Invitee {
                email: email.clone(),
                user_id: user.id,
            }),
            Ok(None) => outcome.not_found.push(email.clone()),
            Err(e) => {
                warn!("User lookup for {} failed: {}", email, e);
                outcome.not_found.push(email.clone());
            }
        }
    }

    outcome
}

/// Deep link inviting someone to `capsule`.
///
/// # Errors
///
/// Returns an error if `base_url` is not a valid URL.
pub fn share_link(base_url: &str, capsule: &Capsule) -> Result<Url> {
    Ok(Url::parse_with_params(
        base_url,
        [("capsuleId", capsule.id.as_str()), ("name", capsule.name.as_str())],
    )?)
}

/// Invite text to send along with a share link.
#[must_use]
pub fn share_message(capsule: &Capsule, inviter_name: Option<&str>, link: &Url) -> String {
    let inviter = inviter_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("A friend");
    let unlock = capsule.unlock_at.format("%b %-d, %Y at %H:%M UTC");

    format!(
        "{inviter} has invited you to join \"{name}\" - a Time Capsule Camera!\n\n\
         We're collecting videos together until {unlock}, when we'll all watch them as a group!\n\n\
         Join with code {code} or open:\n{link}",
        name = capsule.name,
        code = capsule.share_code,
    )
}

/// A random six-digit share code.
#[must_use]
pub fn generate_share_code() -> String {
    rand::rng().random_range(100_000..=999_999u32).to_string()
}

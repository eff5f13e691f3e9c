//! Local accounts: users, password hashes and the signed-in session.

use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use rand_core::OsRng;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::{AuthProvider, UserDirectory};
use crate::error::{Error, Result};
use crate::model::{now, User};
use crate::sharing::is_valid_email;

use super::{encode_time, Storage};

/// Shortest password accepted at sign-up.
pub const MIN_PASSWORD_LEN: usize = 6;

impl Storage {
    /// Insert a user with an already-hashed password.
    pub(crate) fn create_user(
        &self,
        email: &str,
        display_name: &str,
        password_hash: &str,
    ) -> Result<User> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            display_name: display_name.to_string(),
            email: email.to_lowercase(),
        };

        self.with_conn(|conn| {
            if query_user_by_email(conn, &user.email)?.is_some() {
                return Err(Error::EmailTaken {
                    email: user.email.clone(),
                });
            }
            conn.execute(
                "INSERT INTO users (id, email, display_name, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.id,
                    user.email,
                    user.display_name,
                    password_hash,
                    encode_time(now())
                ],
            )?;
            Ok(())
        })?;

        debug!("Created user {} <{}>", user.id, user.email);
        Ok(user)
    }

    /// Make `user_id` the signed-in user, replacing any previous session.
    pub(crate) fn set_session(&self, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO session (slot, user_id, signed_in_at) VALUES (1, ?1, ?2)",
                params![user_id, encode_time(now())],
            )?;
            Ok(())
        })
    }
}

#[async_trait]
impl UserDirectory for Storage {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.trim().to_lowercase();
        self.with_conn(|conn| query_user_by_email(conn, &email))
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, display_name, email FROM users WHERE id = ?1",
                    [id],
                    row_to_user,
                )
                .optional()?)
        })
    }
}

#[async_trait]
impl AuthProvider for Storage {
    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<User> {
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(Error::validation(format!("'{email}' is not a valid email address")));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(Error::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(Error::validation("display name must not be empty"));
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::PasswordHash(e.to_string()))?
            .to_string();

        let user = self.create_user(email, display_name, &password_hash)?;
        self.set_session(&user.id)?;

        info!("Signed up {}", user.email);
        Ok(user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        let email = email.trim().to_lowercase();
        let record = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, display_name, email, password_hash FROM users WHERE email = ?1",
                    [&email],
                    |row| Ok((row_to_user(row)?, row.get::<_, String>(3)?)),
                )
                .optional()?)
        })?;

        let Some((user, stored_hash)) = record else {
            return Err(Error::InvalidCredentials);
        };

        let parsed =
            PasswordHash::new(&stored_hash).map_err(|e| Error::PasswordHash(e.to_string()))?;
        if Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_err()
        {
            return Err(Error::InvalidCredentials);
        }

        self.set_session(&user.id)?;
        info!("Signed in {}", user.email);
        Ok(user)
    }

    async fn sign_out(&self) -> Result<()> {
        let removed = self.with_conn(|conn| Ok(conn.execute("DELETE FROM session", [])?))?;
        if removed > 0 {
            info!("Signed out");
        }
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<User>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT u.id, u.display_name, u.email FROM session s
                     JOIN users u ON u.id = s.user_id
                     WHERE s.slot = 1",
                    [],
                    row_to_user,
                )
                .optional()?)
        })
    }
}

fn query_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            "SELECT id, display_name, email FROM users WHERE email = ?1",
            [email],
            row_to_user,
        )
        .optional()?)
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        display_name: row.get(1)?,
        email: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    #[tokio::test]
    async fn test_sign_up_then_sign_in() {
        let storage = create_test_storage();

        let user = storage
            .sign_up("Alice@Example.com", "secret1", "Alice")
            .await
            .unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(storage.current_session().await.unwrap(), Some(user.clone()));

        storage.sign_out().await.unwrap();
        assert!(storage.current_session().await.unwrap().is_none());

        let again = storage.sign_in("alice@example.com", "secret1").await.unwrap();
        assert_eq!(again, user);
        assert_eq!(storage.current_session().await.unwrap(), Some(user));
    }

    #[tokio::test]
    async fn test_sign_in_wrong_password() {
        let storage = create_test_storage();
        storage.sign_up("bob@example.com", "hunter22", "Bob").await.unwrap();
        storage.sign_out().await.unwrap();

        let err = storage.sign_in("bob@example.com", "wrong!").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
        assert!(storage.current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_in_unknown_user() {
        let storage = create_test_storage();
        let err = storage.sign_in("nobody@example.com", "whatever").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_sign_up_validation() {
        let storage = create_test_storage();

        let err = storage.sign_up("not-an-email", "secret1", "X").await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let err = storage.sign_up("x@example.com", "short", "X").await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let err = storage.sign_up("x@example.com", "secret1", "  ").await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let storage = create_test_storage();
        storage.create_user("carol@example.com", "Carol", "h").unwrap();

        let err = storage
            .create_user("CAROL@example.com", "Other", "h")
            .unwrap_err();
        assert!(matches!(err, Error::EmailTaken { .. }));
    }

    #[tokio::test]
    async fn test_directory_lookups() {
        let storage = create_test_storage();
        let user = storage.create_user("dave@example.com", "Dave", "h").unwrap();

        let by_email = storage.find_by_email(" DAVE@example.com ").await.unwrap();
        assert_eq!(by_email, Some(user.clone()));
        assert_eq!(storage.get_user(&user.id).await.unwrap(), Some(user));
        assert!(storage.find_by_email("eve@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_replaced_on_new_sign_in() {
        let storage = create_test_storage();
        let a = storage.create_user("a@example.com", "A", "h").unwrap();
        let b = storage.create_user("b@example.com", "B", "h").unwrap();

        storage.set_session(&a.id).unwrap();
        storage.set_session(&b.id).unwrap();
        assert_eq!(storage.current_session().await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn test_sign_out_without_session() {
        let storage = create_test_storage();
        storage.sign_out().await.unwrap();
    }
}

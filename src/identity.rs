//! Maps an authenticated email, or a fresh guest session, to the key that
//! namespaces every stored document of that user.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const GUEST_PREFIX: &str = "guest-";

#[derive(Debug, Error, PartialEq)]
pub enum IdentityError {
    #[error("not a usable email address: {0:?}")]
    InvalidEmail(String),
}

/// A storage-safe user key: a cleaned email or a guest token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserKey(String);

impl UserKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_guest(&self) -> bool {
        self.0.starts_with(GUEST_PREFIX) && !self.0.contains('@')
    }

    /// Fresh key for a new guest session.
    pub fn new_guest() -> Self {
        UserKey(format!("{}{}", GUEST_PREFIX, uuid::Uuid::new_v4().simple()))
    }

    /// Rebuilds a key that was previously issued (e.g. from a verified token).
    pub(crate) fn from_trusted(raw: String) -> Self {
        UserKey(raw)
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cleans an email into a single path segment.
///
/// `.` becomes `,`; `#`, `$`, `/`, `[`, `]` and control characters become `_`.
/// The `@` is kept, which is what keeps cleaned emails disjoint from guest keys.
pub fn clean_user_key(email: &str) -> Result<UserKey, IdentityError> {
    let email = email.trim().to_lowercase();
    let mut parts = email.split('@');
    let valid = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => !local.is_empty() && !domain.is_empty(),
        _ => false,
    };
    if !valid {
        return Err(IdentityError::InvalidEmail(email));
    }

    let cleaned: String = email
        .chars()
        .map(|c| match c {
            '.' => ',',
            '#' | '$' | '/' | '[' | ']' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    Ok(UserKey(cleaned))
}

/// Who is making the request. Carried in the session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub key: UserKey,
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl Identity {
    pub fn guest() -> Self {
        Self {
            key: UserKey::new_guest(),
            email: None,
            name: None,
            picture: None,
        }
    }

    pub fn from_google(email: &str, name: Option<String>, picture: Option<String>) -> Result<Self, IdentityError> {
        Ok(Self {
            key: clean_user_key(email)?,
            email: Some(email.trim().to_string()),
            name,
            picture,
        })
    }

    pub fn is_guest(&self) -> bool {
        self.key.is_guest()
    }
}

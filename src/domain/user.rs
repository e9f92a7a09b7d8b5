use std::fmt;

use thiserror::Error;

use crate::domain::chat::CHAT_ID_SEPARATOR;
use crate::store::document::Document;

/// Errors raised when constructing an identifier from raw input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("identifier must not be empty")]
    Empty,
    #[error("identifier {0:?} contains the reserved separator character {1:?}")]
    ReservedSeparator(String, char),
}

/// Key of a user document, assigned by the remote store.
///
/// Validated at construction: chat ids are derived by joining two user ids
/// with [`CHAT_ID_SEPARATOR`], so the separator must never appear inside a
/// user id or two distinct user pairs could derive the same chat id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: impl Into<String>) -> Result<Self, IdentifierError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if raw.contains(CHAT_ID_SEPARATOR) {
            return Err(IdentifierError::ReservedSeparator(raw, CHAT_ID_SEPARATOR));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Subject identifier assigned by the external auth provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AuthId(String);

impl AuthId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identity produced by the external sign-in call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: String,
    pub display_name: Option<String>,
}

impl AuthUser {
    pub fn new(uid: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name,
        }
    }
}

/// A directory entry materialized from the remote `users` collection.
///
/// `extra` keeps the schemaless remainder of the remote document so fields
/// the core does not interpret survive the round trip to consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub auth_id: Option<AuthId>,
    pub display_name: Option<String>,
    pub extra: Document,
}

pub const AUTH_ID_FIELD: &str = "authId";
pub const DISPLAY_NAME_FIELD: &str = "displayName";

impl User {
    /// Builds a user from a remote document. Fields the core interprets are
    /// lifted out; everything else lands in `extra` untouched.
    pub fn from_document(id: UserId, doc: &Document) -> Self {
        let auth_id = doc.get_str(AUTH_ID_FIELD).map(AuthId::new);
        let display_name = doc.get_str(DISPLAY_NAME_FIELD).map(str::to_owned);
        let extra = doc.without_fields(&[AUTH_ID_FIELD, DISPLAY_NAME_FIELD]);
        Self {
            id,
            auth_id,
            display_name,
            extra,
        }
    }
}

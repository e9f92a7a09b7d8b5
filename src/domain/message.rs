use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::user::{IdentifierError, User, UserId};
use crate::store::document::Document;

pub const AUTHOR_ID_FIELD: &str = "authorId";
pub const OTHER_USER_ID_FIELD: &str = "otherUserId";
pub const TEXT_FIELD: &str = "text";
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Key of a message document, assigned by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a consumer hands to `send_message`. The engine stamps the timestamp
/// and the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub author_id: UserId,
    pub other_user_id: UserId,
    pub text: String,
}

/// A message as delivered to chat listeners: fully materialized, with the
/// author resolved against the user mirror and the store timestamp converted
/// to a native instant. Messages are immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub author_id: UserId,
    pub other_user_id: UserId,
    /// Resolved at notification time; `None` when the author is not (or not
    /// yet) present in the mirror.
    pub author: Option<User>,
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

/// Raised when a remote message document violates the data contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageDocumentError {
    #[error("message document is missing required field {0:?}")]
    MissingField(&'static str),
    #[error("message document carries an invalid author id: {0}")]
    InvalidAuthorId(#[from] IdentifierError),
}

impl Message {
    /// Builds a message from a remote document, leaving `author` unresolved.
    pub fn from_document(id: MessageId, doc: &Document) -> Result<Self, MessageDocumentError> {
        let author_id = doc
            .get_str(AUTHOR_ID_FIELD)
            .ok_or(MessageDocumentError::MissingField(AUTHOR_ID_FIELD))?;
        let other_user_id = doc
            .get_str(OTHER_USER_ID_FIELD)
            .ok_or(MessageDocumentError::MissingField(OTHER_USER_ID_FIELD))?;
        let timestamp = doc
            .get_timestamp(TIMESTAMP_FIELD)
            .ok_or(MessageDocumentError::MissingField(TIMESTAMP_FIELD))?;
        let text = doc
            .get_str(TEXT_FIELD)
            .ok_or(MessageDocumentError::MissingField(TEXT_FIELD))?;

        Ok(Self {
            id,
            author_id: UserId::new(author_id)?,
            other_user_id: UserId::new(other_user_id)?,
            author: None,
            timestamp: timestamp.to_datetime(),
            text: text.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::document::{FieldValue, StoreTimestamp};

    fn message_doc() -> Document {
        let mut doc = Document::new();
        doc.insert(AUTHOR_ID_FIELD, FieldValue::text("u1"));
        doc.insert(OTHER_USER_ID_FIELD, FieldValue::text("u2"));
        doc.insert(TEXT_FIELD, FieldValue::text("hi"));
        doc.insert(
            TIMESTAMP_FIELD,
            FieldValue::Timestamp(StoreTimestamp::new(1_700_000_000, 0)),
        );
        doc
    }

    #[test]
    fn from_document_converts_timestamp_to_instant() {
        let message = Message::from_document(MessageId::new("m1"), &message_doc())
            .expect("well-formed doc must materialize");

        assert_eq!(message.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(message.text, "hi");
        assert_eq!(message.author_id.as_str(), "u1");
        assert!(message.author.is_none());
    }

    #[test]
    fn from_document_rejects_missing_timestamp() {
        let mut doc = message_doc();
        doc.remove(TIMESTAMP_FIELD);

        let err = Message::from_document(MessageId::new("m1"), &doc).expect_err("must fail");

        assert_eq!(err, MessageDocumentError::MissingField(TIMESTAMP_FIELD));
    }

    #[test]
    fn from_document_rejects_invalid_author_id() {
        let mut doc = message_doc();
        doc.insert(AUTHOR_ID_FIELD, FieldValue::text("bad-id"));

        let err = Message::from_document(MessageId::new("m1"), &doc).expect_err("must fail");

        assert!(matches!(err, MessageDocumentError::InvalidAuthorId(_)));
    }
}

use std::fmt;

use crate::domain::user::UserId;
use crate::store::document::{Document, FieldValue};

pub const PARTICIPANTS_FIELD: &str = "participants";

/// Joins the two participant ids of a chat. Reserved: [`UserId::new`] rejects
/// ids containing this character.
pub const CHAT_ID_SEPARATOR: char = '-';

/// Key of a chat document, derived deterministically from its two
/// participants rather than assigned by the store. Deriving the id makes
/// chat lookup idempotent without a query.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChatId(String);

impl ChatId {
    /// Derives the chat id for an unordered pair of users: the ids are
    /// sorted lexicographically and joined with [`CHAT_ID_SEPARATOR`], so
    /// argument order never matters.
    pub fn between(a: &UserId, b: &UserId) -> Self {
        let (first, second) = if a.as_str() <= b.as_str() {
            (a, b)
        } else {
            (b, a)
        };
        Self(format!(
            "{}{}{}",
            first.as_str(),
            CHAT_ID_SEPARATOR,
            second.as_str()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chat document: the derived id plus its two participants. Created lazily
/// on first message send and upserted on every send thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    pub participants: [UserId; 2],
}

impl Chat {
    /// The remote representation: a single `participants` list. Writing the
    /// same document repeatedly is the upsert that makes chat creation lazy
    /// and idempotent.
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(
            PARTICIPANTS_FIELD,
            FieldValue::List(
                self.participants
                    .iter()
                    .map(|id| FieldValue::text(id.as_str()))
                    .collect(),
            ),
        );
        doc
    }
}

//! Plain data types shared across the crate: users, chats, messages and
//! their identity conventions. No I/O lives here.

pub mod chat;
pub mod message;
pub mod user;

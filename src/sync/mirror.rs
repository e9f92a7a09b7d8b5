use crate::domain::user::{AuthId, User, UserId};

/// Locally cached snapshot of the remote user directory.
///
/// Rebuilt wholesale on every users-collection snapshot; consumers never see
/// a partially applied update. Lookups are linear scans, which is fine at
/// directory scale but a known limit for large deployments — switch to an
/// indexed map before growing past a few thousand users.
#[derive(Debug, Default)]
pub struct UserMirror {
    users: Vec<User>,
}

impl UserMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole snapshot, preserving the order the store delivered.
    pub fn replace(&mut self, users: Vec<User>) {
        self.users = users;
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// O(n) scan by document key.
    pub fn user_by_id(&self, id: &UserId) -> Option<&User> {
        self.users.iter().find(|user| &user.id == id)
    }

    /// O(n) scan by auth-provider subject id. `None` doubles as the
    /// find-or-create signal on first login.
    pub fn user_for_auth(&self, auth_id: &AuthId) -> Option<&User> {
        self.users
            .iter()
            .find(|user| user.auth_id.as_ref() == Some(auth_id))
    }
}

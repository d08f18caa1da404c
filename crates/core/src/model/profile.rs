use serde::Serialize;

use crate::model::ids::UserId;

/// Account profile owned by the auth layer. Read here only for display and
/// for the administrator capability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub user_id: UserId,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub is_admin: bool,
}

impl Profile {
    #[must_use]
    pub fn learner(user_id: UserId) -> Self {
        Self {
            user_id,
            username: None,
            full_name: None,
            is_admin: false,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        self.full_name
            .as_deref()
            .or(self.username.as_deref())
            .map_or_else(|| self.user_id.to_string(), str::to_owned)
    }
}

use crate::db::User;

/// The user a request was authenticated as.
#[derive(Debug, Clone)]
pub struct SessionUser {
    /// Freshly loaded user row
    pub user: User,
}

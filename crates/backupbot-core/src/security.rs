use crate::domain::UserId;

/// Whether `user_id` may trigger bot commands.
///
/// An empty admin list leaves the bot open to everyone who can reach it.
pub fn is_authorized(user_id: Option<UserId>, admins: &[i64]) -> bool {
    if admins.is_empty() {
        return true;
    }
    let Some(user_id) = user_id else {
        return false;
    };
    admins.contains(&user_id.0)
}

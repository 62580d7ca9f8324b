use crate::domain::UserId;

// ============== Authorization ==============

/// Only the configured operator may broadcast or read statistics.
pub fn is_operator(user_id: Option<UserId>, operator: UserId) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    if operator.0 == 0 {
        return false;
    }
    user_id == operator
}

/// Board-level authorization
///
/// Every board, column, task and comment operation resolves to a board and
/// is checked here before anything is read or written.
///
/// # Permission Model
///
/// 1. **Participation**: the user must own the board or be a member of it
/// 2. **Role**: owner-only actions (edit/delete board, manage members)
///    require [`BoardRole::Owner`]
/// 3. **Resource rules**: deleting a task is allowed for the board owner and
///    the task's creator; deleting a comment for the board owner and the
///    comment's author; members may remove themselves from a board
///
/// # Example
///
/// ```no_run
/// use kanmind_shared::auth::authorization::{require_board_permission, BoardPermission};
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, board_id: Uuid, user_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let access = require_board_permission(&pool, board_id, user_id, BoardPermission::Manage).await?;
/// assert!(access.is_owner());
/// # Ok(())
/// # }
/// ```

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::board::{Board, BoardAccess, BoardRole};

/// Error type for authorization checks
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// The board does not exist
    #[error("Board {0} not found")]
    BoardNotFound(Uuid),

    /// The user neither owns nor belongs to the board
    #[error("Not a member of board {0}")]
    NotParticipant(Uuid),

    /// The user's role is too low for the action
    #[error("Insufficient permissions: requires {}, has {}", .required.as_str(), .actual.as_str())]
    InsufficientRole {
        required: BoardRole,
        actual: BoardRole,
    },

    /// A resource rule denied the action
    #[error("Not authorized to {0}")]
    NotAuthorized(&'static str),

    /// Database error
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// What a request wants to do with a board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardPermission {
    /// View the board and anything under it
    Read,

    /// Create or change columns, tasks and comments
    Write,

    /// Edit or delete the board, manage members
    Manage,
}

impl BoardPermission {
    /// Gets the minimum role required for this permission
    pub fn min_role(&self) -> BoardRole {
        match self {
            BoardPermission::Read | BoardPermission::Write => BoardRole::Member,
            BoardPermission::Manage => BoardRole::Owner,
        }
    }
}

/// Checks resolved access against a permission
///
/// Returns the user's role on success.
pub fn check_board_permission(
    access: &BoardAccess,
    permission: BoardPermission,
) -> Result<BoardRole, AuthzError> {
    let role = access.role.ok_or(AuthzError::NotParticipant(access.board_id))?;
    let required = permission.min_role();

    if !role.has_permission(&required) {
        return Err(AuthzError::InsufficientRole {
            required,
            actual: role,
        });
    }

    Ok(role)
}

/// Loads a board's access for `user_id` and checks `permission`
///
/// # Errors
///
/// - `BoardNotFound` when the board does not exist
/// - `NotParticipant` when the user is neither owner nor member
/// - `InsufficientRole` when a member attempts an owner-only action
pub async fn require_board_permission(
    pool: &PgPool,
    board_id: Uuid,
    user_id: Uuid,
    permission: BoardPermission,
) -> Result<BoardAccess, AuthzError> {
    let access = Board::access_for(pool, board_id, user_id)
        .await?
        .ok_or(AuthzError::BoardNotFound(board_id))?;

    if let Err(err) = check_board_permission(&access, permission) {
        tracing::debug!(
            board_id = %board_id,
            user_id = %user_id,
            permission = ?permission,
            "Board access denied"
        );
        return Err(err);
    }

    Ok(access)
}

/// Board owners delete any task; members only their own
pub fn can_delete_task(access: &BoardAccess, user_id: Uuid, created_by: Option<Uuid>) -> bool {
    access.is_owner() || (access.role.is_some() && created_by == Some(user_id))
}

/// Board owners delete any comment; members only their own
pub fn can_delete_comment(access: &BoardAccess, user_id: Uuid, author_id: Uuid) -> bool {
    access.is_owner() || (access.role.is_some() && author_id == user_id)
}

/// Owners remove anyone; members only themselves
pub fn can_remove_member(access: &BoardAccess, user_id: Uuid, member_id: Uuid) -> bool {
    access.is_owner() || (access.role == Some(BoardRole::Member) && member_id == user_id)
}

/// Fails with `NotAuthorized` unless `allowed`
pub fn require(allowed: bool, action: &'static str) -> Result<(), AuthzError> {
    if allowed {
        Ok(())
    } else {
        Err(AuthzError::NotAuthorized(action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access(role: Option<BoardRole>) -> BoardAccess {
        BoardAccess {
            board_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn test_permission_min_role() {
        assert_eq!(BoardPermission::Read.min_role(), BoardRole::Member);
        assert_eq!(BoardPermission::Write.min_role(), BoardRole::Member);
        assert_eq!(BoardPermission::Manage.min_role(), BoardRole::Owner);
    }

    #[test]
    fn test_outsider_is_denied_everything() {
        let outsider = access(None);
        for permission in [BoardPermission::Read, BoardPermission::Write, BoardPermission::Manage] {
            assert!(matches!(
                check_board_permission(&outsider, permission),
                Err(AuthzError::NotParticipant(_))
            ));
        }
    }

    #[test]
    fn test_member_cannot_manage() {
        let member = access(Some(BoardRole::Member));
        assert!(check_board_permission(&member, BoardPermission::Read).is_ok());
        assert!(check_board_permission(&member, BoardPermission::Write).is_ok());
        assert!(matches!(
            check_board_permission(&member, BoardPermission::Manage),
            Err(AuthzError::InsufficientRole {
                required: BoardRole::Owner,
                actual: BoardRole::Member
            })
        ));

        let err = check_board_permission(&member, BoardPermission::Manage).unwrap_err();
        assert_eq!(err.to_string(), "Insufficient permissions: requires owner, has member");
    }

    #[test]
    fn test_owner_has_every_permission() {
        let owner = access(Some(BoardRole::Owner));
        assert_eq!(
            check_board_permission(&owner, BoardPermission::Manage).unwrap(),
            BoardRole::Owner
        );
    }

    #[test]
    fn test_task_deletion_rules() {
        let me = Uuid::new_v4();
        let someone = Uuid::new_v4();

        assert!(can_delete_task(&access(Some(BoardRole::Owner)), me, Some(someone)));
        assert!(can_delete_task(&access(Some(BoardRole::Member)), me, Some(me)));
        assert!(!can_delete_task(&access(Some(BoardRole::Member)), me, Some(someone)));
        assert!(!can_delete_task(&access(Some(BoardRole::Member)), me, None));
        assert!(!can_delete_task(&access(None), me, Some(me)));
    }

    #[test]
    fn test_comment_deletion_rules() {
        let me = Uuid::new_v4();
        let someone = Uuid::new_v4();

        assert!(can_delete_comment(&access(Some(BoardRole::Owner)), me, someone));
        assert!(can_delete_comment(&access(Some(BoardRole::Member)), me, me));
        assert!(!can_delete_comment(&access(Some(BoardRole::Member)), me, someone));
        assert!(!can_delete_comment(&access(None), me, me));
    }

    #[test]
    fn test_member_removal_rules() {
        let me = Uuid::new_v4();
        let someone = Uuid::new_v4();

        assert!(can_remove_member(&access(Some(BoardRole::Owner)), me, someone));
        assert!(can_remove_member(&access(Some(BoardRole::Member)), me, me));
        assert!(!can_remove_member(&access(Some(BoardRole::Member)), me, someone));
        assert!(!can_remove_member(&access(None), me, me));
    }

    #[test]
    fn test_require() {
        assert!(require(true, "delete this task").is_ok());
        assert!(matches!(
            require(false, "delete this task"),
            Err(AuthzError::NotAuthorized("delete this task"))
        ));
    }
}

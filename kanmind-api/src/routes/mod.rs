/// API route handlers
///
/// Handlers are organized by resource:
///
/// - `health`: health check
/// - `auth`: registration, login, tokens and the current user
/// - `boards`: boards and board membership
/// - `columns`: board columns
/// - `tasks`: tasks, assignees and reviewers
/// - `comments`: task comments
///
/// Each handler authorizes against the owning board before it validates
/// the payload or touches the store.

pub mod auth;
pub mod boards;
pub mod columns;
pub mod comments;
pub mod health;
pub mod tasks;

use uuid::Uuid;

pub(crate) fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

pub(crate) fn trim_opt(value: &mut Option<String>) {
    if let Some(value) = value.as_mut() {
        trim_in_place(value);
    }
}

pub(crate) fn join_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

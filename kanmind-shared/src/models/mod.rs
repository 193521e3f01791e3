/// Database models for KanMind
///
/// Each model owns its SQL. Multi-row writes (board with members, task with
/// reviewers, column reorder, member removal) run in a single transaction
/// inside the model function.
///
/// # Models
///
/// - `user`: accounts and the public user summary
/// - `auth_token`: opaque login tokens
/// - `board`: boards, roles and board list counters
/// - `board_member`: board membership
/// - `column`: ordered columns and the status derived from their titles
/// - `task`: tasks, priorities and reviewers
/// - `comment`: task comments

pub mod auth_token;
pub mod board;
pub mod board_member;
pub mod column;
pub mod comment;
pub mod task;
pub mod user;

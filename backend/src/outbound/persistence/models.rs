//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain. Each read row converts into its domain
//! record, reporting stored values the domain rejects as a plain message so
//! repositories can wrap it in their own query error.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{
    Comment, CommentAuthor, CommentText, EmailAddress, Group, GroupStatus, IngestedComment, Keyword,
    KeywordCategory, KeywordWord, MatchOptions, Post, Role, Task, TaskPriority, TaskStatus,
    TaskType, User, UserAccount, UserId, Username, VkCommentRef,
};

use super::schema::{comments, groups, keywords, posts, tasks, users};

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub(crate) fn into_account(self) -> Result<UserAccount, String> {
        let username = Username::new(self.username).map_err(|err| err.to_string())?;
        let email = EmailAddress::new(&self.email).map_err(|err| err.to_string())?;
        let role = self.role.parse::<Role>().map_err(|err| err.to_string())?;
        Ok(UserAccount {
            user: User::new(
                UserId::from_uuid(self.id),
                username,
                email,
                role,
                self.created_at,
            ),
            password_hash: self.password_hash,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub(crate) struct NewUserRow<'a> {
    pub id: Uuid,
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: &'a str,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = groups)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct GroupRow {
    pub id: Uuid,
    pub vk_group_id: Option<i64>,
    pub screen_name: String,
    pub name: Option<String>,
    pub status: String,
    pub status_reason: Option<String>,
    pub upload_task_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GroupRow {
    pub(crate) fn into_domain(self) -> Result<Group, String> {
        Ok(Group {
            id: self.id,
            vk_group_id: self.vk_group_id,
            screen_name: self.screen_name,
            name: self.name,
            status: self.status.parse::<GroupStatus>()?,
            status_reason: self.status_reason,
            upload_task_id: self.upload_task_id,
            created_by: self.created_by.map(UserId::from_uuid),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = groups)]
pub(crate) struct NewGroupRow<'a> {
    pub id: Uuid,
    pub vk_group_id: Option<i64>,
    pub screen_name: &'a str,
    pub name: Option<&'a str>,
    pub status: &'a str,
    pub status_reason: Option<&'a str>,
    pub upload_task_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> From<&'a Group> for NewGroupRow<'a> {
    fn from(group: &'a Group) -> Self {
        Self {
            id: group.id,
            vk_group_id: group.vk_group_id,
            screen_name: &group.screen_name,
            name: group.name.as_deref(),
            status: group.status.as_str(),
            status_reason: group.status_reason.as_deref(),
            upload_task_id: group.upload_task_id,
            created_by: group.created_by.map(|id| *id.as_uuid()),
            created_at: group.created_at,
            updated_at: group.updated_at,
        }
    }
}

/// Validation outcome written back by the worker.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = groups)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct GroupResolutionUpdate<'a> {
    pub status: &'a str,
    pub vk_group_id: Option<i64>,
    pub name: Option<&'a str>,
    pub status_reason: Option<&'a str>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = posts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct PostRow {
    pub id: Uuid,
    pub owner_id: i64,
    pub vk_post_id: i64,
    pub group_id: Option<Uuid>,
    pub text: String,
    pub comments_count: i32,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            vk_post_id: row.vk_post_id,
            group_id: row.group_id,
            text: row.text,
            comments_count: row.comments_count,
            published_at: row.published_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = posts)]
pub(crate) struct NewPostRow<'a> {
    pub id: Uuid,
    pub owner_id: i64,
    pub vk_post_id: i64,
    pub group_id: Option<Uuid>,
    pub text: &'a str,
    pub comments_count: i32,
    pub published_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = comments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct CommentRow {
    pub id: Uuid,
    pub text: String,
    pub author_id: Option<Uuid>,
    pub vk_author_id: Option<i64>,
    pub post_id: Option<Uuid>,
    pub owner_id: Option<i64>,
    pub vk_comment_id: Option<i64>,
    pub analyzed: bool,
    pub matched_keywords: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommentRow {
    pub(crate) fn into_domain(self) -> Result<Comment, String> {
        let author = match (self.author_id, self.vk_author_id) {
            (Some(user), _) => CommentAuthor::User(UserId::from_uuid(user)),
            (None, Some(vk)) => CommentAuthor::Vk(vk),
            (None, None) => return Err(format!("comment {} has no author", self.id)),
        };
        let vk = match (self.owner_id, self.vk_comment_id) {
            (Some(owner_id), Some(comment_id)) => Some(VkCommentRef {
                owner_id,
                comment_id,
            }),
            _ => None,
        };
        let text = CommentText::from_ingested(&self.text)
            .ok_or_else(|| format!("comment {} has empty text", self.id))?;
        Ok(Comment {
            id: self.id,
            text,
            author,
            post_id: self.post_id,
            vk,
            analyzed: self.analyzed,
            matched_keywords: self.matched_keywords,
            published_at: self.published_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = comments)]
pub(crate) struct NewCommentRow<'a> {
    pub id: Uuid,
    pub text: &'a str,
    pub author_id: Option<Uuid>,
    pub vk_author_id: Option<i64>,
    pub post_id: Option<Uuid>,
    pub owner_id: Option<i64>,
    pub vk_comment_id: Option<i64>,
    pub analyzed: bool,
    pub matched_keywords: &'a [String],
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> From<&'a Comment> for NewCommentRow<'a> {
    fn from(comment: &'a Comment) -> Self {
        let (author_id, vk_author_id) = match comment.author {
            CommentAuthor::User(user) => (Some(*user.as_uuid()), None),
            CommentAuthor::Vk(vk) => (None, Some(vk)),
        };
        Self {
            id: comment.id,
            text: comment.text.as_str(),
            author_id,
            vk_author_id,
            post_id: comment.post_id,
            owner_id: comment.vk.map(|vk| vk.owner_id),
            vk_comment_id: comment.vk.map(|vk| vk.comment_id),
            analyzed: comment.analyzed,
            matched_keywords: &comment.matched_keywords,
            published_at: comment.published_at,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}

/// Ingested comment; timestamps come from column defaults.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = comments)]
pub(crate) struct IngestedCommentRow<'a> {
    pub id: Uuid,
    pub text: &'a str,
    pub vk_author_id: i64,
    pub post_id: Uuid,
    pub owner_id: i64,
    pub vk_comment_id: i64,
    pub analyzed: bool,
    pub matched_keywords: &'a [String],
    pub published_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a IngestedComment> for IngestedCommentRow<'a> {
    fn from(comment: &'a IngestedComment) -> Self {
        Self {
            id: comment.id,
            text: comment.text.as_str(),
            vk_author_id: comment.vk_author_id,
            post_id: comment.post_id,
            owner_id: comment.vk.owner_id,
            vk_comment_id: comment.vk.comment_id,
            analyzed: true,
            matched_keywords: &comment.matches.words,
            published_at: comment.published_at,
        }
    }
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = comments)]
pub(crate) struct CommentUpdate<'a> {
    pub text: &'a str,
    pub analyzed: bool,
    pub matched_keywords: &'a [String],
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Keywords
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = keywords)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct KeywordRow {
    pub id: Uuid,
    pub word: String,
    pub category: String,
    pub is_active: bool,
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub match_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KeywordRow {
    pub(crate) fn into_domain(self) -> Result<Keyword, String> {
        Ok(Keyword {
            id: self.id,
            word: KeywordWord::new(&self.word).map_err(|err| err.to_string())?,
            category: KeywordCategory::new(&self.category).map_err(|err| err.to_string())?,
            is_active: self.is_active,
            options: MatchOptions {
                case_sensitive: self.case_sensitive,
                whole_word: self.whole_word,
            },
            match_count: self.match_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = keywords)]
pub(crate) struct KeywordWriteRow<'a> {
    pub id: Uuid,
    pub word: &'a str,
    pub category: &'a str,
    pub is_active: bool,
    pub case_sensitive: bool,
    pub whole_word: bool,
    pub match_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> From<&'a Keyword> for KeywordWriteRow<'a> {
    fn from(keyword: &'a Keyword) -> Self {
        Self {
            id: keyword.id,
            word: keyword.word.as_str(),
            category: keyword.category.as_str(),
            is_active: keyword.is_active,
            case_sensitive: keyword.options.case_sensitive,
            whole_word: keyword.options.whole_word,
            match_count: keyword.match_count,
            created_at: keyword.created_at,
            updated_at: keyword.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct TaskRow {
    pub id: Uuid,
    pub task_type: String,
    pub status: String,
    pub priority: i16,
    pub progress: i16,
    pub parameters: Value,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRow {
    pub(crate) fn into_domain(self) -> Result<Task, String> {
        let priority = u8::try_from(self.priority)
            .map_err(|err| err.to_string())
            .and_then(|value| TaskPriority::new(value).map_err(|err| err.to_string()))?;
        let progress = u8::try_from(self.progress).map_err(|err| err.to_string())?;
        Ok(Task {
            id: self.id,
            task_type: self.task_type.parse::<TaskType>().map_err(|err| err.to_string())?,
            status: self.status.parse::<TaskStatus>()?,
            priority,
            progress,
            parameters: self.parameters,
            result: self.result,
            error: self.error,
            created_by: self.created_by.map(UserId::from_uuid),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = tasks)]
pub(crate) struct NewTaskRow<'a> {
    pub id: Uuid,
    pub task_type: &'a str,
    pub status: &'a str,
    pub priority: i16,
    pub progress: i16,
    pub parameters: &'a Value,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> From<&'a Task> for NewTaskRow<'a> {
    fn from(task: &'a Task) -> Self {
        Self {
            id: task.id,
            task_type: task.task_type.as_str(),
            status: task.status.as_str(),
            priority: i16::from(task.priority.get()),
            progress: i16::from(task.progress),
            parameters: &task.parameters,
            created_by: task.created_by.map(|id| *id.as_uuid()),
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

/// Mutable task state written on every transition or progress report.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = tasks)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct TaskStateUpdate<'a> {
    pub status: &'a str,
    pub progress: i16,
    pub result: Option<&'a Value>,
    pub error: Option<&'a str>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> From<&'a Task> for TaskStateUpdate<'a> {
    fn from(task: &'a Task) -> Self {
        Self {
            status: task.status.as_str(),
            progress: i16::from(task.progress),
            result: task.result.as_ref(),
            error: task.error.as_deref(),
            started_at: task.started_at,
            completed_at: task.completed_at,
            updated_at: task.updated_at,
        }
    }
}

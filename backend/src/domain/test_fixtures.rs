//! Shared builders for domain unit tests.

use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone, Utc};
use mockable::Clock;
use serde_json::json;
use uuid::Uuid;

use super::{
    Comment, CommentAuthor, CommentText, EmailAddress, Keyword, KeywordCategory, KeywordWord,
    MatchOptions, Principal, Role, Task, TaskParameters, TaskPriority, TaskType, User,
    UserAccount, UserId, Username,
};

pub(crate) fn fixture_timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53)
        .single()
        .expect("valid fixture timestamp")
}

struct FixtureClock {
    utc_now: DateTime<Utc>,
}

impl Clock for FixtureClock {
    fn local(&self) -> DateTime<Local> {
        self.utc_now.with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.utc_now
    }
}

pub(crate) fn fixture_clock() -> Arc<dyn Clock> {
    Arc::new(FixtureClock {
        utc_now: fixture_timestamp(),
    })
}

pub(crate) fn principal(role: Role) -> Principal {
    Principal {
        user_id: UserId::random(),
        role,
    }
}

pub(crate) fn account(user_id: UserId, username: &str, role: Role) -> UserAccount {
    UserAccount {
        user: User::new(
            user_id,
            Username::new(username).expect("valid username"),
            EmailAddress::new(format!("{username}@example.com")).expect("valid email"),
            role,
            fixture_timestamp(),
        ),
        password_hash: "$argon2id$fixture".to_owned(),
    }
}

pub(crate) fn user_comment(author: UserId, text: &str) -> Comment {
    Comment {
        id: Uuid::new_v4(),
        text: CommentText::new(text).expect("valid text"),
        author: CommentAuthor::User(author),
        post_id: None,
        vk: None,
        analyzed: false,
        matched_keywords: Vec::new(),
        published_at: None,
        created_at: fixture_timestamp(),
        updated_at: fixture_timestamp(),
    }
}

pub(crate) fn keyword(word: &str) -> Keyword {
    Keyword {
        id: Uuid::new_v4(),
        word: KeywordWord::new(word).expect("valid word"),
        category: KeywordCategory::default(),
        is_active: true,
        options: MatchOptions::default(),
        match_count: 0,
        created_at: fixture_timestamp(),
        updated_at: fixture_timestamp(),
    }
}

pub(crate) fn task(task_type: TaskType, created_by: Option<UserId>) -> Task {
    let raw = match task_type {
        TaskType::FetchComments => json!({ "group_id": 1 }),
        TaskType::ProcessGroups => json!({ "group_ids": [Uuid::new_v4()] }),
        TaskType::AnalyzePosts => json!({ "limit": 50 }),
    };
    let parameters = TaskParameters::parse(task_type, &raw).expect("valid parameters");
    Task::new(
        &parameters,
        TaskPriority::default(),
        created_by,
        fixture_timestamp(),
    )
}

//! Shared runtime doubles for task processor tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::ports::{VkComment, VkGroup, VkPage, VkPost, VkSource, VkSourceError};
use crate::domain::task_processor::{BackoffJitter, RetrySleeper};

#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateSleeper;

#[async_trait]
impl RetrySleeper for ImmediateSleeper {
    async fn sleep(&self, _duration: Duration) {}
}

#[derive(Default)]
pub struct RecordingSleeper(pub Mutex<Vec<Duration>>);

impl RecordingSleeper {
    pub fn recorded(&self) -> Vec<Duration> {
        match self.0.lock() {
            Ok(entries) => entries.clone(),
            Err(_) => panic!("sleeper mutex"),
        }
    }
}

#[async_trait]
impl RetrySleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        let mut entries = match self.0.lock() {
            Ok(entries) => entries,
            Err(_) => panic!("sleeper mutex"),
        };
        entries.push(duration);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl BackoffJitter for NoJitter {
    fn jittered_delay(&self, base: Duration, _attempt: u32, _now: DateTime<Utc>) -> Duration {
        base
    }
}

type Script<T> = Mutex<VecDeque<Result<T, VkSourceError>>>;

fn next<T>(script: &Script<T>, method: &str) -> Result<T, VkSourceError> {
    let mut entries = match script.lock() {
        Ok(entries) => entries,
        Err(_) => panic!("vk script mutex"),
    };
    entries
        .pop_front()
        .unwrap_or_else(|| Err(VkSourceError::decode(format!("{method} script exhausted"))))
}

/// VK source answering every method from a per-method script.
#[derive(Default)]
pub struct ScriptedVkSource {
    groups: Script<Vec<VkGroup>>,
    posts: Script<VkPage<VkPost>>,
    post: Script<Option<VkPost>>,
    comments: Script<VkPage<VkComment>>,
    requested_group_keys: Mutex<Vec<Vec<String>>>,
}

impl ScriptedVkSource {
    pub fn with_groups(self, answer: Result<Vec<VkGroup>, VkSourceError>) -> Self {
        push(&self.groups, answer);
        self
    }

    pub fn with_posts(self, answer: Result<VkPage<VkPost>, VkSourceError>) -> Self {
        push(&self.posts, answer);
        self
    }

    pub fn with_post(self, answer: Result<Option<VkPost>, VkSourceError>) -> Self {
        push(&self.post, answer);
        self
    }

    pub fn with_comments(self, answer: Result<VkPage<VkComment>, VkSourceError>) -> Self {
        push(&self.comments, answer);
        self
    }

    pub fn requested_group_keys(&self) -> Vec<Vec<String>> {
        match self.requested_group_keys.lock() {
            Ok(keys) => keys.clone(),
            Err(_) => panic!("vk keys mutex"),
        }
    }
}

fn push<T>(script: &Script<T>, answer: Result<T, VkSourceError>) {
    match script.lock() {
        Ok(mut entries) => entries.push_back(answer),
        Err(_) => panic!("vk script mutex"),
    }
}

#[async_trait]
impl VkSource for ScriptedVkSource {
    async fn groups_by_ids(&self, keys: &[String]) -> Result<Vec<VkGroup>, VkSourceError> {
        match self.requested_group_keys.lock() {
            Ok(mut requested) => requested.push(keys.to_vec()),
            Err(_) => panic!("vk keys mutex"),
        }
        next(&self.groups, "groups.getById")
    }

    async fn wall_posts(
        &self,
        _owner_id: i64,
        _offset: u32,
        _count: u32,
    ) -> Result<VkPage<VkPost>, VkSourceError> {
        next(&self.posts, "wall.get")
    }

    async fn wall_post(
        &self,
        _owner_id: i64,
        _post_id: i64,
    ) -> Result<Option<VkPost>, VkSourceError> {
        next(&self.post, "wall.getById")
    }

    async fn wall_comments(
        &self,
        _owner_id: i64,
        _post_id: i64,
        _offset: u32,
        _count: u32,
    ) -> Result<VkPage<VkComment>, VkSourceError> {
        next(&self.comments, "wall.getComments")
    }
}

//! DTOs for decoding VK API responses.
//!
//! Every method answers with either `{"response": …}` or
//! `{"error": {"error_code", "error_msg"}}`. Newer API versions wrap some
//! list responses in an object, so those decode through untagged enums that
//! accept both shapes.

use serde::Deserialize;

use crate::domain::ports::{VkComment, VkGroup, VkPage, VkPost};

#[derive(Debug, Deserialize)]
pub(super) struct EnvelopeDto<T> {
    pub(super) response: Option<T>,
    pub(super) error: Option<ApiErrorDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ApiErrorDto {
    pub(super) error_code: i64,
    #[serde(default)]
    pub(super) error_msg: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum GroupsResponseDto {
    Wrapped {
        #[serde(default)]
        groups: Vec<GroupDto>,
    },
    Plain(Vec<GroupDto>),
}

impl GroupsResponseDto {
    pub(super) fn into_domain(self) -> Vec<VkGroup> {
        let groups = match self {
            Self::Wrapped { groups } | Self::Plain(groups) => groups,
        };
        groups.into_iter().map(GroupDto::into_domain).collect()
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct GroupDto {
    id: i64,
    #[serde(default)]
    screen_name: String,
    #[serde(default)]
    name: String,
    deactivated: Option<String>,
}

impl GroupDto {
    fn into_domain(self) -> VkGroup {
        VkGroup {
            id: self.id.abs(),
            screen_name: self.screen_name,
            name: self.name,
            deactivated: self.deactivated,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ListDto<T> {
    #[serde(default)]
    count: i64,
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

impl<T> ListDto<T> {
    pub(super) fn into_page<U>(self, map: impl FnMut(T) -> U) -> VkPage<U> {
        VkPage {
            count: self.count,
            items: self.items.into_iter().map(map).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(super) enum PostsByIdDto {
    Wrapped {
        #[serde(default)]
        items: Vec<PostDto>,
    },
    Plain(Vec<PostDto>),
}

impl PostsByIdDto {
    pub(super) fn into_first(self) -> Option<VkPost> {
        let posts = match self {
            Self::Wrapped { items } | Self::Plain(items) => items,
        };
        posts.into_iter().next().map(PostDto::into_domain)
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct CountDto {
    #[serde(default)]
    count: i64,
}

#[derive(Debug, Deserialize)]
pub(super) struct PostDto {
    id: i64,
    owner_id: i64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    date: i64,
    comments: Option<CountDto>,
}

impl PostDto {
    pub(super) fn into_domain(self) -> VkPost {
        VkPost {
            id: self.id,
            owner_id: self.owner_id,
            text: self.text,
            comments_count: self.comments.map_or(0, |comments| comments.count),
            date: self.date,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct CommentDto {
    id: i64,
    #[serde(default)]
    from_id: i64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    date: i64,
    #[serde(default)]
    deleted: bool,
}

impl CommentDto {
    pub(super) fn into_domain(self) -> VkComment {
        VkComment {
            id: self.id,
            from_id: self.from_id,
            text: self.text,
            date: self.date,
            deleted: self.deleted,
        }
    }
}

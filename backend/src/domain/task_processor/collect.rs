//! `fetch_comments`: pull wall posts and their comments from a community.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use crate::domain::ports::{VkComment, VkPost};
use crate::domain::{
    CommentMatches, CommentText, FetchCommentsParams, IngestedComment, KeywordHit,
    KeywordHitTally, KeywordMatcher, PostUpsert, VkCommentRef,
};

use super::{ExecutionError, ProgressReporter, TaskProcessor};

/// Largest page `wall.get` and `wall.getComments` return.
pub(super) const VK_PAGE_SIZE: u32 = 100;

#[derive(Debug, Default)]
struct CollectionTally {
    posts_processed: usize,
    comments_fetched: usize,
    comments_inserted: usize,
    duplicates_skipped: usize,
    keyword_matches: i64,
}

impl CollectionTally {
    fn into_result(self) -> Value {
        json!({
            "posts_processed": self.posts_processed,
            "comments_fetched": self.comments_fetched,
            "comments_inserted": self.comments_inserted,
            "duplicates_skipped": self.duplicates_skipped,
            "keyword_matches": self.keyword_matches,
        })
    }
}

fn from_unix(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
}

fn page_size(remaining: u32) -> u32 {
    remaining.min(VK_PAGE_SIZE)
}

impl TaskProcessor {
    pub(super) async fn fetch_comments(
        &self,
        params: &FetchCommentsParams,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<Value, ExecutionError> {
        let owner_id = -params.group_id.abs();
        let monitored_group = self
            .groups
            .find_valid_matching(&[], &[params.group_id.abs()])
            .await?
            .first()
            .map(|group| group.id);
        let matcher = self.active_matcher().await?;

        let posts = match params.post_id {
            Some(post_id) => {
                let post = self
                    .vk_call("wall.getById", || self.vk.wall_post(owner_id, post_id))
                    .await?;
                let post = post.ok_or_else(|| {
                    ExecutionError::Rejected(format!("post {owner_id}_{post_id} not found"))
                })?;
                vec![post]
            }
            None => self.recent_posts(owner_id, params.posts_limit).await?,
        };

        let mut tally = CollectionTally::default();
        let total = posts.len();
        for (index, post) in posts.iter().enumerate() {
            self.collect_post(post, monitored_group, &matcher, params.comments_limit, &mut tally)
                .await?;
            progress.report(index + 1, total).await;
        }
        Ok(tally.into_result())
    }

    async fn recent_posts(&self, owner_id: i64, limit: u32) -> Result<Vec<VkPost>, ExecutionError> {
        let mut posts = Vec::new();
        let mut offset = 0_u32;
        while posts.len() < limit as usize {
            let remaining = limit.saturating_sub(offset);
            let count = page_size(remaining);
            let page = self
                .vk_call("wall.get", || self.vk.wall_posts(owner_id, offset, count))
                .await?;
            let received = page.items.len();
            posts.extend(page.items);
            offset = offset.saturating_add(u32::try_from(received).unwrap_or(u32::MAX));
            if received == 0 || i64::from(offset) >= page.count {
                break;
            }
        }
        posts.truncate(limit as usize);
        Ok(posts)
    }

    async fn collect_post(
        &self,
        post: &VkPost,
        group_id: Option<Uuid>,
        matcher: &KeywordMatcher,
        comments_limit: u32,
        tally: &mut CollectionTally,
    ) -> Result<(), ExecutionError> {
        let post_id = self
            .posts
            .upsert(&PostUpsert {
                owner_id: post.owner_id,
                vk_post_id: post.id,
                group_id,
                text: post.text.clone(),
                comments_count: i32::try_from(post.comments_count).unwrap_or(i32::MAX),
                published_at: from_unix(post.date),
            })
            .await?;
        tally.posts_processed += 1;
        if post.comments_count <= 0 {
            return Ok(());
        }

        let fetched = self
            .post_comments(post.owner_id, post.id, comments_limit)
            .await?;
        tally.comments_fetched += fetched.len();

        let mut batch = Vec::new();
        let mut hits_by_vk_id: Vec<(i64, Vec<KeywordHit>)> = Vec::new();
        for comment in fetched {
            let Some(ingested) = ingest(&comment, post.owner_id, post_id, matcher, &mut hits_by_vk_id)
            else {
                continue;
            };
            batch.push(ingested);
        }
        if batch.is_empty() {
            return Ok(());
        }

        let inserted = self.comments.insert_ingested(&batch).await?;
        tally.comments_inserted += inserted.len();
        tally.duplicates_skipped += batch.len().saturating_sub(inserted.len());

        let mut hit_tally = KeywordHitTally::default();
        for (vk_id, hits) in &hits_by_vk_id {
            if inserted.contains(vk_id) {
                hit_tally.record(hits);
            }
        }
        tally.keyword_matches += hit_tally.total();
        debug!(
            owner_id = post.owner_id,
            post_id = post.id,
            inserted = inserted.len(),
            "post comments collected"
        );
        Ok(())
    }

    async fn post_comments(
        &self,
        owner_id: i64,
        post_id: i64,
        limit: u32,
    ) -> Result<Vec<VkComment>, ExecutionError> {
        let mut comments = Vec::new();
        let mut offset = 0_u32;
        while offset < limit {
            let count = page_size(limit - offset);
            let page = self
                .vk_call("wall.getComments", || {
                    self.vk.wall_comments(owner_id, post_id, offset, count)
                })
                .await?;
            let received = page.items.len();
            comments.extend(page.items);
            offset = offset.saturating_add(u32::try_from(received).unwrap_or(u32::MAX));
            if received == 0 || i64::from(offset) >= page.count {
                break;
            }
        }
        comments.truncate(limit as usize);
        Ok(comments)
    }
}

/// Normalise one VK comment; deleted and blank comments are dropped.
fn ingest(
    comment: &VkComment,
    owner_id: i64,
    post_id: Uuid,
    matcher: &KeywordMatcher,
    hits_by_vk_id: &mut Vec<(i64, Vec<KeywordHit>)>,
) -> Option<IngestedComment> {
    if comment.deleted {
        return None;
    }
    let text = CommentText::from_ingested(&comment.text)?;
    let hits = matcher.find(text.as_str());
    let matches = CommentMatches::from_hits(&hits);
    if !hits.is_empty() {
        hits_by_vk_id.push((comment.id, hits));
    }
    Some(IngestedComment {
        id: Uuid::new_v4(),
        text,
        vk_author_id: comment.from_id,
        post_id,
        vk: VkCommentRef {
            owner_id,
            comment_id: comment.id,
        },
        matches,
        published_at: from_unix(comment.date),
    })
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use crate::domain::test_fixtures::keyword;

    fn vk_comment(id: i64, text: &str, deleted: bool) -> VkComment {
        VkComment {
            id,
            from_id: 77,
            text: text.to_owned(),
            date: 1_700_000_000,
            deleted,
        }
    }

    #[test]
    fn ingest_skips_deleted_and_blank_comments() {
        let matcher = KeywordMatcher::default();
        let mut hits = Vec::new();
        assert!(ingest(&vk_comment(1, "text", true), -1, Uuid::new_v4(), &matcher, &mut hits).is_none());
        assert!(ingest(&vk_comment(2, "   ", false), -1, Uuid::new_v4(), &matcher, &mut hits).is_none());
    }

    #[test]
    fn ingest_records_matched_words() {
        let keywords = [keyword("promo")];
        let matcher = KeywordMatcher::new(&keywords);
        let mut hits = Vec::new();
        let ingested = ingest(&vk_comment(5, "Big PROMO today", false), -10, Uuid::new_v4(), &matcher, &mut hits)
            .expect("comment kept");
        assert_eq!(ingested.matches.words, vec!["promo".to_owned()]);
        assert_eq!(ingested.matches.keyword_ids, vec![keywords[0].id]);
        assert_eq!(ingested.vk, VkCommentRef { owner_id: -10, comment_id: 5 });
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn page_size_is_capped() {
        assert_eq!(page_size(1_000), VK_PAGE_SIZE);
        assert_eq!(page_size(7), 7);
    }
}

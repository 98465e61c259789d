//! PostgreSQL-backed `PostRepository` implementation using Diesel ORM.

use async_trait::async_trait;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::domain::ports::{PostRepository, PostRepositoryError};
use crate::domain::{Listing, Post, PostFilter, PostUpsert};

use super::diesel_basic_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::diesel_helpers::page_bounds;
use super::models::{NewPostRow, PostRow};
use super::pool::{DbPool, PoolError};
use super::schema::posts;

/// Diesel-backed implementation of the `PostRepository` port.
#[derive(Clone)]
pub struct DieselPostRepository {
    pool: DbPool,
}

impl DieselPostRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> PostRepositoryError {
    map_basic_pool_error(error, PostRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> PostRepositoryError {
    map_basic_diesel_error(
        error,
        PostRepositoryError::query,
        PostRepositoryError::connection,
    )
}

fn filtered(filter: &PostFilter) -> posts::BoxedQuery<'_, Pg> {
    let mut query = posts::table.into_boxed();
    if let Some(group_id) = filter.group_id {
        query = query.filter(posts::group_id.eq(group_id));
    }
    if let Some(owner_id) = filter.owner_id {
        query = query.filter(posts::owner_id.eq(owner_id));
    }
    query
}

#[async_trait]
impl PostRepository for DieselPostRepository {
    async fn upsert(&self, post: &PostUpsert) -> Result<Uuid, PostRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = NewPostRow {
            id: Uuid::new_v4(),
            owner_id: post.owner_id,
            vk_post_id: post.vk_post_id,
            group_id: post.group_id,
            text: &post.text,
            comments_count: post.comments_count,
            published_at: post.published_at,
        };

        // Refreshing keeps the original id so stored comments stay linked.
        diesel::insert_into(posts::table)
            .values(&row)
            .on_conflict((posts::owner_id, posts::vk_post_id))
            .do_update()
            .set((
                posts::text.eq(excluded(posts::text)),
                posts::comments_count.eq(excluded(posts::comments_count)),
                posts::published_at.eq(excluded(posts::published_at)),
                posts::updated_at.eq(diesel::dsl::now),
            ))
            .returning(posts::id)
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)
    }

    async fn list(&self, filter: &PostFilter) -> Result<Listing<Post>, PostRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let (limit, offset) = page_bounds(&filter.page);

        let total: i64 = filtered(filter)
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let rows: Vec<PostRow> = filtered(filter)
            .select(PostRow::as_select())
            .order((
                posts::published_at.desc().nulls_last(),
                posts::created_at.desc(),
            ))
            .limit(limit)
            .offset(offset)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(Listing::new(rows.into_iter().map(Post::from).collect(), total))
    }
}

#[cfg(test)]
mod tests {
    //! SQL shape checks for listing filters.
    use super::*;
    use diesel::debug_query;

    #[test]
    fn owner_filter_applies() {
        let filter = PostFilter {
            owner_id: Some(-42),
            ..PostFilter::default()
        };
        let rendered = debug_query::<Pg, _>(&filtered(&filter).select(posts::id)).to_string();
        assert!(rendered.contains("\"posts\".\"owner_id\" = $1"));
        assert!(!rendered.contains("group_id"));
    }
}

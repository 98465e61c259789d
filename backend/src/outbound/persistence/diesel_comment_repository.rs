//! PostgreSQL-backed `CommentRepository` implementation using Diesel ORM.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt as _;
use diesel_async::{AsyncConnection as _, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::domain::ports::{CommentRepository, CommentRepositoryError};
use crate::domain::{
    Comment, CommentFilter, CommentMatches, CommentStats, IngestedComment, Listing,
};

use super::diesel_basic_error_mapping::{map_basic_pool_error, map_conflicting_diesel_error};
use super::diesel_helpers::{corrupt_row, like_pattern, page_bounds};
use super::models::{CommentRow, CommentUpdate, IngestedCommentRow, NewCommentRow};
use super::pool::{DbPool, PoolError};
use super::schema::{comments, keywords};

/// Diesel-backed implementation of the `CommentRepository` port.
#[derive(Clone)]
pub struct DieselCommentRepository {
    pool: DbPool,
}

impl DieselCommentRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> CommentRepositoryError {
    map_basic_pool_error(error, CommentRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> CommentRepositoryError {
    map_conflicting_diesel_error(
        error,
        CommentRepositoryError::query,
        CommentRepositoryError::connection,
        CommentRepositoryError::conflict,
    )
}

fn row_to_comment(row: CommentRow) -> Result<Comment, CommentRepositoryError> {
    row.into_domain()
        .map_err(|message| CommentRepositoryError::query(corrupt_row("comments", message)))
}

fn filtered(filter: &CommentFilter) -> comments::BoxedQuery<'_, Pg> {
    let mut query = comments::table.into_boxed();
    if let Some(author) = filter.author_id {
        query = query.filter(comments::author_id.eq(*author.as_uuid()));
    }
    if let Some(post_id) = filter.post_id {
        query = query.filter(comments::post_id.eq(post_id));
    }
    if let Some(analyzed) = filter.analyzed {
        query = query.filter(comments::analyzed.eq(analyzed));
    }
    match filter.has_matches {
        Some(true) => query = query.filter(comments::matched_keywords.ne(Vec::<String>::new())),
        Some(false) => query = query.filter(comments::matched_keywords.eq(Vec::<String>::new())),
        None => {}
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        query = query.filter(comments::text.ilike(like_pattern(search)));
    }
    query
}

/// Per-keyword counter increments for the rows that were actually inserted.
fn counter_increments(ingested: &[IngestedComment], inserted: &[i64]) -> BTreeMap<Uuid, i64> {
    let mut increments = BTreeMap::new();
    for comment in ingested
        .iter()
        .filter(|comment| inserted.contains(&comment.vk.comment_id))
    {
        for keyword_id in &comment.matches.keyword_ids {
            *increments.entry(*keyword_id).or_insert(0) += 1;
        }
    }
    increments
}

async fn bump_match_counts(
    conn: &mut AsyncPgConnection,
    increments: &BTreeMap<Uuid, i64>,
) -> Result<(), diesel::result::Error> {
    // Ordered by id so concurrent workers lock keyword rows in the same order.
    for (keyword_id, comments) in increments {
        diesel::update(keywords::table.find(*keyword_id))
            .set(keywords::match_count.eq(keywords::match_count + comments))
            .execute(conn)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl CommentRepository for DieselCommentRepository {
    async fn insert(&self, comment: &Comment) -> Result<(), CommentRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(comments::table)
            .values(NewCommentRow::from(comment))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn insert_ingested(
        &self,
        ingested: &[IngestedComment],
    ) -> Result<Vec<i64>, CommentRepositoryError> {
        if ingested.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<IngestedCommentRow<'_>> =
            ingested.iter().map(IngestedCommentRow::from).collect();

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                let inserted: Vec<Option<i64>> = diesel::insert_into(comments::table)
                    .values(&rows)
                    .on_conflict((comments::owner_id, comments::vk_comment_id))
                    .do_nothing()
                    .returning(comments::vk_comment_id)
                    .get_results(conn)
                    .await?;
                let inserted: Vec<i64> = inserted.into_iter().flatten().collect();
                bump_match_counts(conn, &counter_increments(ingested, &inserted)).await?;
                Ok(inserted)
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Comment>, CommentRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<CommentRow> = comments::table
            .find(id)
            .select(CommentRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_comment).transpose()
    }

    async fn update(&self, comment: &Comment) -> Result<(), CommentRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let changes = CommentUpdate {
            text: comment.text.as_str(),
            analyzed: comment.analyzed,
            matched_keywords: &comment.matched_keywords,
            updated_at: comment.updated_at,
        };
        let updated = diesel::update(comments::table.find(comment.id))
            .set(&changes)
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if updated == 0 {
            return Err(CommentRepositoryError::query(format!(
                "comment {} not found",
                comment.id
            )));
        }
        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, CommentRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted = diesel::delete(comments::table.find(id))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(deleted > 0)
    }

    async fn list(
        &self,
        filter: &CommentFilter,
    ) -> Result<Listing<Comment>, CommentRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let (limit, offset) = page_bounds(&filter.page);

        let total: i64 = filtered(filter)
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let rows: Vec<CommentRow> = filtered(filter)
            .select(CommentRow::as_select())
            .order((comments::created_at.desc(), comments::id.desc()))
            .limit(limit)
            .offset(offset)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        let items = rows
            .into_iter()
            .map(row_to_comment)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Listing::new(items, total))
    }

    async fn list_unanalyzed(
        &self,
        post_ids: &[Uuid],
        limit: u32,
    ) -> Result<Vec<Comment>, CommentRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let mut query = comments::table
            .filter(comments::analyzed.eq(false))
            .into_boxed();
        if !post_ids.is_empty() {
            query = query.filter(comments::post_id.eq_any(post_ids));
        }
        let rows: Vec<CommentRow> = query
            .select(CommentRow::as_select())
            .order((comments::created_at.asc(), comments::id.asc()))
            .limit(i64::from(limit))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_comment).collect()
    }

    async fn save_analysis(
        &self,
        id: &Uuid,
        matches: &CommentMatches,
        analyzed_at: DateTime<Utc>,
    ) -> Result<bool, CommentRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            async move {
                let updated = diesel::update(
                    comments::table
                        .find(id)
                        .filter(comments::analyzed.eq(false)),
                )
                .set((
                    comments::analyzed.eq(true),
                    comments::matched_keywords.eq(&matches.words),
                    comments::updated_at.eq(analyzed_at),
                ))
                .execute(conn)
                .await?;
                if updated == 0 {
                    return Ok(false);
                }
                if !matches.is_empty() {
                    diesel::update(keywords::table.filter(keywords::id.eq_any(&matches.keyword_ids)))
                        .set(keywords::match_count.eq(keywords::match_count + 1))
                        .execute(conn)
                        .await?;
                }
                Ok(true)
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }

    async fn stats(&self) -> Result<CommentStats, CommentRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let total: i64 = comments::table
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let analyzed: i64 = comments::table
            .filter(comments::analyzed.eq(true))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let with_matches: i64 = comments::table
            .filter(comments::matched_keywords.ne(Vec::<String>::new()))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(CommentStats {
            total,
            analyzed,
            with_matches,
        })
    }
}

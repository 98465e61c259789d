//! PostgreSQL-backed `KeywordRepository` implementation using Diesel ORM.

use async_trait::async_trait;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::domain::ports::{KeywordRepository, KeywordRepositoryError};
use crate::domain::{Keyword, KeywordFilter, KeywordStats, Listing, TopKeyword};

use super::diesel_basic_error_mapping::{map_basic_pool_error, map_conflicting_diesel_error};
use super::diesel_helpers::{corrupt_row, like_pattern, page_bounds};
use super::models::{KeywordRow, KeywordWriteRow};
use super::pool::{DbPool, PoolError};
use super::schema::keywords;

/// Diesel-backed implementation of the `KeywordRepository` port.
#[derive(Clone)]
pub struct DieselKeywordRepository {
    pool: DbPool,
}

impl DieselKeywordRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> KeywordRepositoryError {
    map_basic_pool_error(error, KeywordRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> KeywordRepositoryError {
    map_conflicting_diesel_error(
        error,
        KeywordRepositoryError::query,
        KeywordRepositoryError::connection,
        KeywordRepositoryError::conflict,
    )
}

fn row_to_keyword(row: KeywordRow) -> Result<Keyword, KeywordRepositoryError> {
    row.into_domain()
        .map_err(|message| KeywordRepositoryError::query(corrupt_row("keywords", message)))
}

fn filtered(filter: &KeywordFilter) -> keywords::BoxedQuery<'_, Pg> {
    let mut query = keywords::table.into_boxed();
    if let Some(category) = &filter.category {
        query = query.filter(keywords::category.eq(category.as_str()));
    }
    if let Some(is_active) = filter.is_active {
        query = query.filter(keywords::is_active.eq(is_active));
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        query = query.filter(keywords::word.ilike(like_pattern(search)));
    }
    query
}

#[async_trait]
impl KeywordRepository for DieselKeywordRepository {
    async fn insert(&self, keyword: &Keyword) -> Result<(), KeywordRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(keywords::table)
            .values(KeywordWriteRow::from(keyword))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn insert_many(&self, keywords: &[Keyword]) -> Result<usize, KeywordRepositoryError> {
        if keywords.is_empty() {
            return Ok(0);
        }
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<KeywordWriteRow<'_>> = keywords.iter().map(KeywordWriteRow::from).collect();
        diesel::insert_into(keywords::table)
            .values(&rows)
            .on_conflict((keywords::word, keywords::category))
            .do_nothing()
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<Keyword>, KeywordRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<KeywordRow> = keywords::table
            .find(id)
            .select(KeywordRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_keyword).transpose()
    }

    async fn update(&self, keyword: &Keyword) -> Result<(), KeywordRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(keywords::table.find(keyword.id))
            .set(KeywordWriteRow::from(keyword))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if updated == 0 {
            return Err(KeywordRepositoryError::query(format!(
                "keyword {} not found",
                keyword.id
            )));
        }
        Ok(())
    }

    async fn delete(&self, id: &Uuid) -> Result<bool, KeywordRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted = diesel::delete(keywords::table.find(id))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(deleted > 0)
    }

    async fn list(
        &self,
        filter: &KeywordFilter,
    ) -> Result<Listing<Keyword>, KeywordRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let (limit, offset) = page_bounds(&filter.page);

        let total: i64 = filtered(filter)
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let rows: Vec<KeywordRow> = filtered(filter)
            .select(KeywordRow::as_select())
            .order((keywords::word.asc(), keywords::category.asc()))
            .limit(limit)
            .offset(offset)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        let items = rows
            .into_iter()
            .map(row_to_keyword)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Listing::new(items, total))
    }

    async fn list_active(&self) -> Result<Vec<Keyword>, KeywordRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<KeywordRow> = keywords::table
            .filter(keywords::is_active.eq(true))
            .select(KeywordRow::as_select())
            .order(keywords::word.asc())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_keyword).collect()
    }

    async fn stats(&self, top: usize) -> Result<KeywordStats, KeywordRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let total: i64 = keywords::table
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let active: i64 = keywords::table
            .filter(keywords::is_active.eq(true))
            .count()
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        let leaders: Vec<(Uuid, String, String, i64)> = keywords::table
            .select((
                keywords::id,
                keywords::word,
                keywords::category,
                keywords::match_count,
            ))
            .order((keywords::match_count.desc(), keywords::word.asc()))
            .limit(i64::try_from(top).unwrap_or(i64::MAX))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(KeywordStats {
            total,
            active,
            top: leaders
                .into_iter()
                .map(|(id, word, category, match_count)| TopKeyword {
                    id,
                    word,
                    category,
                    match_count,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    //! SQL shape checks for listing filters.
    use super::*;
    use crate::domain::KeywordCategory;
    use diesel::debug_query;

    fn sql(filter: &KeywordFilter) -> String {
        debug_query::<Pg, _>(&filtered(filter).select(keywords::id)).to_string()
    }

    #[test]
    fn category_and_activity_filters_apply() {
        let filter = KeywordFilter {
            category: Some(KeywordCategory::new("spam").expect("category")),
            is_active: Some(true),
            ..KeywordFilter::default()
        };
        let rendered = sql(&filter);
        assert!(rendered.contains("\"keywords\".\"category\" = $1"));
        assert!(rendered.contains("\"keywords\".\"is_active\" = $2"));
    }

    #[test]
    fn search_matches_words_case_insensitively() {
        let filter = KeywordFilter {
            search: Some("promo".to_owned()),
            ..KeywordFilter::default()
        };
        let rendered = sql(&filter);
        assert!(rendered.contains("\"keywords\".\"word\" ILIKE $1"));
        assert!(rendered.contains("%promo%"));
    }
}

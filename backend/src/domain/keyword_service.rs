//! Keyword management use-cases.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use mockable::Clock;
use tracing::info;
use uuid::Uuid;

use crate::domain::ports::{
    BulkKeywordOutcome, KeywordCommand, KeywordQuery, KeywordRepository, KeywordRepositoryError,
};
use crate::domain::{
    Error, Keyword, KeywordCategory, KeywordDraft, KeywordFilter, KeywordPatch, KeywordWord,
    Listing, MatchOptions, Principal,
};

fn map_repository_error(error: KeywordRepositoryError) -> Error {
    match error {
        KeywordRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("keyword repository unavailable: {message}"))
        }
        KeywordRepositoryError::Query { message } => {
            Error::internal(format!("keyword repository error: {message}"))
        }
        KeywordRepositoryError::Conflict { .. } => {
            Error::conflict("keyword already exists in this category")
        }
    }
}

fn require_admin(principal: &Principal) -> Result<(), Error> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(Error::forbidden("keyword management requires the admin role"))
    }
}

fn keyword_not_found(id: Uuid) -> Error {
    Error::not_found(format!("keyword {id} not found"))
}

/// Keyword service implementing the command and query driving ports.
#[derive(Clone)]
pub struct KeywordService<R> {
    keywords: Arc<R>,
    clock: Arc<dyn Clock>,
}

impl<R> KeywordService<R> {
    /// Create a service over the keyword repository.
    pub fn new(keywords: Arc<R>, clock: Arc<dyn Clock>) -> Self {
        Self { keywords, clock }
    }
}

impl<R> KeywordService<R>
where
    R: KeywordRepository,
{
    async fn load(&self, id: Uuid) -> Result<Keyword, Error> {
        self.keywords
            .find_by_id(&id)
            .await
            .map_err(map_repository_error)?
            .ok_or_else(|| keyword_not_found(id))
    }

    fn build(&self, draft: KeywordDraft) -> Keyword {
        let now = self.clock.utc();
        Keyword {
            id: Uuid::new_v4(),
            word: draft.word,
            category: draft.category,
            is_active: draft.is_active,
            options: draft.options,
            match_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl<R> KeywordCommand for KeywordService<R>
where
    R: KeywordRepository,
{
    async fn create(&self, principal: &Principal, draft: KeywordDraft) -> Result<Keyword, Error> {
        require_admin(principal)?;
        let keyword = self.build(draft);
        self.keywords
            .insert(&keyword)
            .await
            .map_err(map_repository_error)?;
        info!(keyword_id = %keyword.id, word = keyword.word.as_str(), "keyword created");
        Ok(keyword)
    }

    async fn bulk_create(
        &self,
        principal: &Principal,
        words: String,
        category: KeywordCategory,
        options: MatchOptions,
    ) -> Result<BulkKeywordOutcome, Error> {
        require_admin(principal)?;
        let mut seen = HashSet::new();
        let mut skipped = 0;
        let mut batch = Vec::new();
        for line in words.lines() {
            let Ok(word) = KeywordWord::new(line) else {
                skipped += 1;
                continue;
            };
            if !seen.insert(word.as_str().to_lowercase()) {
                skipped += 1;
                continue;
            }
            batch.push(self.build(KeywordDraft {
                word,
                category: category.clone(),
                is_active: true,
                options,
            }));
        }

        let created = if batch.is_empty() {
            0
        } else {
            self.keywords
                .insert_many(&batch)
                .await
                .map_err(map_repository_error)?
        };
        skipped += batch.len().saturating_sub(created);
        info!(created, skipped, category = category.as_str(), "bulk keyword import");
        Ok(BulkKeywordOutcome { created, skipped })
    }

    async fn update(
        &self,
        principal: &Principal,
        id: Uuid,
        patch: KeywordPatch,
    ) -> Result<Keyword, Error> {
        require_admin(principal)?;
        let mut keyword = self.load(id).await?;
        if patch.is_empty() {
            return Ok(keyword);
        }
        keyword.apply(patch, self.clock.utc());
        self.keywords
            .update(&keyword)
            .await
            .map_err(map_repository_error)?;
        info!(keyword_id = %id, "keyword updated");
        Ok(keyword)
    }

    async fn delete(&self, principal: &Principal, id: Uuid) -> Result<(), Error> {
        require_admin(principal)?;
        let deleted = self
            .keywords
            .delete(&id)
            .await
            .map_err(map_repository_error)?;
        if !deleted {
            return Err(keyword_not_found(id));
        }
        info!(keyword_id = %id, "keyword deleted");
        Ok(())
    }
}

#[async_trait]
impl<R> KeywordQuery for KeywordService<R>
where
    R: KeywordRepository,
{
    async fn get(&self, id: Uuid) -> Result<Keyword, Error> {
        self.load(id).await
    }

    async fn list(&self, filter: KeywordFilter) -> Result<Listing<Keyword>, Error> {
        self.keywords
            .list(&filter)
            .await
            .map_err(map_repository_error)
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use crate::domain::ports::MockKeywordRepository;
    use crate::domain::test_fixtures::{fixture_clock, keyword, principal};
    use crate::domain::{ErrorCode, Role};

    fn service(repo: MockKeywordRepository) -> KeywordService<MockKeywordRepository> {
        KeywordService::new(Arc::new(repo), fixture_clock())
    }

    fn draft(word: &str) -> KeywordDraft {
        KeywordDraft {
            word: KeywordWord::new(word).expect("word"),
            category: KeywordCategory::default(),
            is_active: true,
            options: MatchOptions::default(),
        }
    }

    #[tokio::test]
    async fn non_admin_cannot_create() {
        let mut repo = MockKeywordRepository::new();
        repo.expect_insert().times(0);
        let err = service(repo)
            .create(&principal(Role::User), draft("promo"))
            .await
            .expect_err("forbidden");
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn duplicate_create_is_conflict() {
        let mut repo = MockKeywordRepository::new();
        repo.expect_insert()
            .returning(|_| Err(KeywordRepositoryError::conflict("keywords_word_category_key")));
        let err = service(repo)
            .create(&principal(Role::Admin), draft("promo"))
            .await
            .expect_err("conflict");
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn bulk_create_skips_blank_and_repeated_lines() {
        let mut repo = MockKeywordRepository::new();
        repo.expect_insert_many()
            .withf(|batch| batch.len() == 3)
            .times(1)
            .returning(|batch| Ok(batch.len() - 1));

        let outcome = service(repo)
            .bulk_create(
                &principal(Role::Admin),
                "promo\n\n  sale \nPromo\ncasino\n   \n".to_owned(),
                KeywordCategory::new("spam").expect("category"),
                MatchOptions::default(),
            )
            .await
            .expect("bulk create");
        assert_eq!(outcome.created, 2);
        assert_eq!(outcome.skipped, 4);
    }

    #[tokio::test]
    async fn bulk_create_with_only_blank_lines_skips_repository() {
        let mut repo = MockKeywordRepository::new();
        repo.expect_insert_many().times(0);
        let outcome = service(repo)
            .bulk_create(
                &principal(Role::Admin),
                "\n \n".to_owned(),
                KeywordCategory::default(),
                MatchOptions::default(),
            )
            .await
            .expect("bulk create");
        assert_eq!(outcome, BulkKeywordOutcome { created: 0, skipped: 2 });
    }

    #[tokio::test]
    async fn empty_patch_does_not_write() {
        let stored = keyword("promo");
        let mut repo = MockKeywordRepository::new();
        repo.expect_find_by_id()
            .returning(move |_| Ok(Some(stored.clone())));
        repo.expect_update().times(0);

        let unchanged = service(repo)
            .update(&principal(Role::Admin), Uuid::new_v4(), KeywordPatch::default())
            .await
            .expect("no-op update");
        assert_eq!(unchanged.word.as_str(), "promo");
    }

    #[tokio::test]
    async fn deleting_missing_keyword_is_not_found() {
        let mut repo = MockKeywordRepository::new();
        repo.expect_delete().returning(|_| Ok(false));
        let err = service(repo)
            .delete(&principal(Role::Admin), Uuid::new_v4())
            .await
            .expect_err("missing");
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}

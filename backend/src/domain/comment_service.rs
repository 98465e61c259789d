//! Comment CRUD and the per-comment keyword analysis use-case.

use std::sync::Arc;

use async_trait::async_trait;
use mockable::Clock;
use tracing::info;
use uuid::Uuid;

use crate::domain::ports::{
    CommentCommand, CommentQuery, CommentRepository, CommentRepositoryError,
    UserPersistenceError, UserRepository,
};
use crate::domain::{
    Comment, CommentAuthor, CommentFilter, CommentText, Error, KeywordAnalysis, Listing,
    Principal, analyze_default_keywords,
};

fn map_comment_error(error: CommentRepositoryError) -> Error {
    match error {
        CommentRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("comment repository unavailable: {message}"))
        }
        CommentRepositoryError::Query { message } => {
            Error::internal(format!("comment repository error: {message}"))
        }
        CommentRepositoryError::Conflict { message } => {
            Error::invalid_request(format!("comment references missing data: {message}"))
        }
    }
}

fn map_user_error(error: UserPersistenceError) -> Error {
    match error {
        UserPersistenceError::Connection { message } => {
            Error::service_unavailable(format!("user repository unavailable: {message}"))
        }
        UserPersistenceError::Query { message } | UserPersistenceError::Conflict { message } => {
            Error::internal(format!("user repository error: {message}"))
        }
    }
}

fn comment_not_found(id: Uuid) -> Error {
    Error::not_found(format!("comment {id} not found"))
}

/// Comment service implementing the command and query driving ports.
#[derive(Clone)]
pub struct CommentService<C, U> {
    comments: Arc<C>,
    users: Arc<U>,
    clock: Arc<dyn Clock>,
}

impl<C, U> CommentService<C, U> {
    /// Create a service over the comment and user repositories.
    pub fn new(comments: Arc<C>, users: Arc<U>, clock: Arc<dyn Clock>) -> Self {
        Self {
            comments,
            users,
            clock,
        }
    }
}

impl<C, U> CommentService<C, U>
where
    C: CommentRepository,
    U: UserRepository,
{
    async fn load(&self, id: Uuid) -> Result<Comment, Error> {
        self.comments
            .find_by_id(&id)
            .await
            .map_err(map_comment_error)?
            .ok_or_else(|| comment_not_found(id))
    }

    async fn load_owned(&self, principal: &Principal, id: Uuid) -> Result<Comment, Error> {
        let comment = self.load(id).await?;
        if !comment.author.is_owned_by(&principal.user_id) {
            return Err(Error::forbidden("only the author may modify this comment"));
        }
        Ok(comment)
    }
}

#[async_trait]
impl<C, U> CommentCommand for CommentService<C, U>
where
    C: CommentRepository,
    U: UserRepository,
{
    async fn create(
        &self,
        principal: &Principal,
        text: CommentText,
        post_id: Option<Uuid>,
    ) -> Result<Comment, Error> {
        let author_exists = self
            .users
            .find_by_id(&principal.user_id)
            .await
            .map_err(map_user_error)?
            .is_some();
        if !author_exists {
            return Err(Error::not_found(format!(
                "author {} does not exist",
                principal.user_id
            )));
        }

        let now = self.clock.utc();
        let comment = Comment {
            id: Uuid::new_v4(),
            text,
            author: CommentAuthor::User(principal.user_id),
            post_id,
            vk: None,
            analyzed: false,
            matched_keywords: Vec::new(),
            published_at: None,
            created_at: now,
            updated_at: now,
        };
        self.comments
            .insert(&comment)
            .await
            .map_err(map_comment_error)?;
        info!(comment_id = %comment.id, author_id = %principal.user_id, "comment created");
        Ok(comment)
    }

    async fn update(
        &self,
        principal: &Principal,
        id: Uuid,
        text: CommentText,
    ) -> Result<Comment, Error> {
        let mut comment = self.load_owned(principal, id).await?;
        comment.revise(text, self.clock.utc());
        self.comments
            .update(&comment)
            .await
            .map_err(map_comment_error)?;
        info!(comment_id = %id, "comment updated");
        Ok(comment)
    }

    async fn delete(&self, principal: &Principal, id: Uuid) -> Result<(), Error> {
        self.load_owned(principal, id).await?;
        let deleted = self.comments.delete(&id).await.map_err(map_comment_error)?;
        if !deleted {
            return Err(comment_not_found(id));
        }
        info!(comment_id = %id, "comment deleted");
        Ok(())
    }

    async fn analyze(&self, id: Uuid) -> Result<KeywordAnalysis, Error> {
        let mut comment = self.load(id).await?;
        let analysis = analyze_default_keywords(comment.text.as_str());
        let matched = std::mem::take(&mut comment.matched_keywords);
        comment.mark_analyzed(matched, self.clock.utc());
        self.comments
            .update(&comment)
            .await
            .map_err(map_comment_error)?;
        info!(comment_id = %id, score = analysis.score, "comment analyzed");
        Ok(analysis)
    }
}

#[async_trait]
impl<C, U> CommentQuery for CommentService<C, U>
where
    C: CommentRepository,
    U: UserRepository,
{
    async fn get(&self, id: Uuid) -> Result<Comment, Error> {
        self.load(id).await
    }

    async fn list(&self, filter: CommentFilter) -> Result<Listing<Comment>, Error> {
        self.comments.list(&filter).await.map_err(map_comment_error)
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use crate::domain::ports::{MockCommentRepository, MockUserRepository};
    use crate::domain::test_fixtures::{account, fixture_clock, principal, user_comment};
    use crate::domain::{ErrorCode, Role};
    use rstest::rstest;

    fn service(
        comments: MockCommentRepository,
        users: MockUserRepository,
    ) -> CommentService<MockCommentRepository, MockUserRepository> {
        CommentService::new(Arc::new(comments), Arc::new(users), fixture_clock())
    }

    #[tokio::test]
    async fn create_persists_comment_for_existing_author() {
        let author = principal(Role::User);
        let user_id = author.user_id;
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_id()
            .returning(move |_| Ok(Some(account(user_id, "author", Role::User))));
        let mut comments = MockCommentRepository::new();
        comments
            .expect_insert()
            .withf(move |comment| comment.author == CommentAuthor::User(user_id))
            .times(1)
            .returning(|_| Ok(()));

        let created = service(comments, users)
            .create(&author, CommentText::new("hello").expect("text"), None)
            .await
            .expect("created");
        assert_eq!(created.text.as_str(), "hello");
        assert!(!created.analyzed);
    }

    #[tokio::test]
    async fn create_rejects_unknown_author() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_id().returning(|_| Ok(None));
        let mut comments = MockCommentRepository::new();
        comments.expect_insert().times(0);

        let err = service(comments, users)
            .create(
                &principal(Role::User),
                CommentText::new("hello").expect("text"),
                None,
            )
            .await
            .expect_err("missing author");
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn update_by_other_user_is_forbidden() {
        let owner = principal(Role::User);
        let intruder = principal(Role::User);
        let stored = user_comment(owner.user_id, "original");
        let mut comments = MockCommentRepository::new();
        comments
            .expect_find_by_id()
            .returning(move |_| Ok(Some(stored.clone())));
        comments.expect_update().times(0);

        let err = service(comments, MockUserRepository::new())
            .update(
                &intruder,
                Uuid::new_v4(),
                CommentText::new("edited").expect("text"),
            )
            .await
            .expect_err("not the author");
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn update_resets_analysis() {
        let owner = principal(Role::User);
        let mut stored = user_comment(owner.user_id, "original");
        stored.analyzed = true;
        stored.matched_keywords = vec!["promo".to_owned()];
        let mut comments = MockCommentRepository::new();
        comments
            .expect_find_by_id()
            .returning(move |_| Ok(Some(stored.clone())));
        comments
            .expect_update()
            .withf(|comment| !comment.analyzed && comment.matched_keywords.is_empty())
            .times(1)
            .returning(|_| Ok(()));

        let updated = service(comments, MockUserRepository::new())
            .update(&owner, Uuid::new_v4(), CommentText::new("edited").expect("text"))
            .await
            .expect("updated");
        assert_eq!(updated.text.as_str(), "edited");
    }

    #[tokio::test]
    async fn ingested_comments_cannot_be_deleted() {
        let mut stored = user_comment(principal(Role::User).user_id, "from vk");
        stored.author = CommentAuthor::Vk(42);
        let mut comments = MockCommentRepository::new();
        comments
            .expect_find_by_id()
            .returning(move |_| Ok(Some(stored.clone())));
        comments.expect_delete().times(0);

        let err = service(comments, MockUserRepository::new())
            .delete(&principal(Role::Admin), Uuid::new_v4())
            .await
            .expect_err("no local owner");
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[rstest]
    #[case(CommentRepositoryError::connection("down"), ErrorCode::ServiceUnavailable)]
    #[case(CommentRepositoryError::query("bad sql"), ErrorCode::InternalError)]
    #[tokio::test]
    async fn get_maps_repository_errors(
        #[case] failure: CommentRepositoryError,
        #[case] expected: ErrorCode,
    ) {
        let mut comments = MockCommentRepository::new();
        comments
            .expect_find_by_id()
            .returning(move |_| Err(failure.clone()));
        let err = service(comments, MockUserRepository::new())
            .get(Uuid::new_v4())
            .await
            .expect_err("repository failure");
        assert_eq!(err.code(), expected);
    }

    #[tokio::test]
    async fn analyze_marks_comment_and_scores_default_words() {
        let stored = user_comment(principal(Role::User).user_id, "Спам! Реклама и СПАМ");
        let mut comments = MockCommentRepository::new();
        comments
            .expect_find_by_id()
            .returning(move |_| Ok(Some(stored.clone())));
        comments
            .expect_update()
            .withf(|comment| comment.analyzed)
            .times(1)
            .returning(|_| Ok(()));

        let analysis = service(comments, MockUserRepository::new())
            .analyze(Uuid::new_v4())
            .await
            .expect("analysis");
        assert_eq!(analysis.counts.get("спам"), Some(&2));
        assert_eq!(analysis.score, 2);
    }

    #[tokio::test]
    async fn analyze_missing_comment_is_not_found() {
        let mut comments = MockCommentRepository::new();
        comments.expect_find_by_id().returning(|_| Ok(None));
        let err = service(comments, MockUserRepository::new())
            .analyze(Uuid::new_v4())
            .await
            .expect_err("missing");
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}

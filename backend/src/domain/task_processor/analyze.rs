//! `analyze_posts`: match stored, unanalyzed comments against active keywords.

use serde_json::{Value, json};

use crate::domain::{AnalyzePostsParams, CommentMatches, KeywordHitTally};

use super::{ExecutionError, ProgressReporter, TaskProcessor};

/// Comments analysed between progress writes.
const PROGRESS_STEP: usize = 100;

impl TaskProcessor {
    pub(super) async fn analyze_posts(
        &self,
        params: &AnalyzePostsParams,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<Value, ExecutionError> {
        let comments = self
            .comments
            .list_unanalyzed(&params.post_ids, params.limit)
            .await?;
        let matcher = self.active_matcher().await?;

        // Counters commit with each save; a retry only counts what is still unanalyzed.
        let mut tally = KeywordHitTally::default();
        let mut analyzed = 0_usize;
        let total = comments.len();
        for (index, comment) in comments.iter().enumerate() {
            let hits = matcher.find(comment.text.as_str());
            let saved = self
                .comments
                .save_analysis(&comment.id, &CommentMatches::from_hits(&hits), self.clock.utc())
                .await?;
            if saved {
                analyzed += 1;
                tally.record(&hits);
            }
            let done = index + 1;
            if done % PROGRESS_STEP == 0 {
                progress.report(done, total).await;
            }
        }

        Ok(json!({
            "comments_analyzed": analyzed,
            "keyword_matches": tally.total(),
        }))
    }
}

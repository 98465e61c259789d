//! Aggregated statistics served by the dashboard endpoint.

use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::job::QueueStats;

/// Comment totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentStats {
    pub total: i64,
    pub analyzed: i64,
    pub with_matches: i64,
}

/// Keyword leaderboard entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopKeyword {
    pub id: Uuid,
    pub word: String,
    pub category: String,
    pub match_count: i64,
}

/// Keyword totals and leaderboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KeywordStats {
    pub total: i64,
    pub active: i64,
    /// Highest `match_count` first.
    pub top: Vec<TopKeyword>,
}

/// Everything the dashboard renders.
///
/// Status maps are keyed by the status' storage string and always include
/// every status, with zero for missing rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub groups: BTreeMap<String, i64>,
    pub comments: CommentStats,
    pub keywords: KeywordStats,
    pub tasks: BTreeMap<String, i64>,
    pub queues: Vec<QueueStats>,
}

/// Number of keywords listed in [`KeywordStats::top`].
pub const TOP_KEYWORDS: usize = 5;

/// Fill a status map so every known status appears.
pub fn status_counts<'a>(
    known: impl IntoIterator<Item = &'a str>,
    observed: impl IntoIterator<Item = (String, i64)>,
) -> BTreeMap<String, i64> {
    let mut counts: BTreeMap<String, i64> = known
        .into_iter()
        .map(|status| (status.to_owned(), 0))
        .collect();
    for (status, count) in observed {
        *counts.entry(status).or_insert(0) += count;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_counts_fill_missing_statuses() {
        let counts = status_counts(["a", "b", "c"], [("b".to_owned(), 4)]);
        assert_eq!(counts.get("a"), Some(&0));
        assert_eq!(counts.get("b"), Some(&4));
        assert_eq!(counts.len(), 3);
    }
}

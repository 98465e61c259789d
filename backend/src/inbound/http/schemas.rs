//! Response envelopes shared by several handlers.

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{Listing, Page};

/// One page of a listing.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    /// Rows in this page.
    pub items: Vec<T>,
    /// Rows matching the filter across all pages.
    pub total: i64,
    /// Page size used.
    pub limit: u32,
    /// Rows skipped.
    pub offset: u32,
}

impl<T> ListResponse<T> {
    /// Convert a domain listing, mapping each row into its response shape.
    pub fn from_listing<D>(listing: Listing<D>, page: Page, map: impl FnMut(D) -> T) -> Self {
        Self {
            items: listing.items.into_iter().map(map).collect(),
            total: listing.total,
            limit: page.limit(),
            offset: page.offset(),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use serde_json::json;

    #[test]
    fn serialises_page_bounds_with_items() {
        let page = Page::new(Some(2), Some(4)).expect("page");
        let response = ListResponse::from_listing(Listing::new(vec![1, 2], 9), page, |n| n * 10);

        assert_eq!(
            serde_json::to_value(&response).expect("json"),
            json!({"items": [10, 20], "total": 9, "limit": 2, "offset": 4})
        );
    }
}

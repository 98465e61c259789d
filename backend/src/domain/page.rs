//! Offset pagination bounds shared by every listing.

/// Default page size when the caller does not ask for one.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;
/// Largest page size a caller may request.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Validation failure for page bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PageError {
    /// `limit` outside `1..=MAX_PAGE_LIMIT`.
    #[error("limit must be between 1 and {max}")]
    LimitOutOfRange {
        /// Upper bound.
        max: u32,
    },
}

/// Validated `limit`/`offset` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    limit: u32,
    offset: u32,
}

impl Page {
    /// Build page bounds, applying defaults for missing values.
    ///
    /// # Examples
    /// ```
    /// use vk_monitor::domain::Page;
    ///
    /// let page = Page::new(None, Some(40)).unwrap();
    /// assert_eq!(page.limit(), 20);
    /// assert_eq!(page.offset(), 40);
    /// ```
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Result<Self, PageError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(PageError::LimitOutOfRange {
                max: MAX_PAGE_LIMIT,
            });
        }
        Ok(Self {
            limit,
            offset: offset.unwrap_or(0),
        })
    }

    /// Maximum number of rows to return.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> u32 {
        self.offset
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// One page of results plus the unpaginated total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing<T> {
    /// Rows in the requested window.
    pub items: Vec<T>,
    /// Rows matching the filter across all pages.
    pub total: i64,
}

impl<T> Listing<T> {
    /// Wrap a page of rows.
    pub fn new(items: Vec<T>, total: i64) -> Self {
        Self { items, total }
    }

    /// Convert every row, keeping the total.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Listing<U> {
        Listing {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

impl<T> Default for Listing<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some(0))]
    #[case(Some(MAX_PAGE_LIMIT + 1))]
    fn rejects_out_of_range_limits(#[case] limit: Option<u32>) {
        assert_eq!(
            Page::new(limit, None),
            Err(PageError::LimitOutOfRange {
                max: MAX_PAGE_LIMIT
            })
        );
    }

    #[test]
    fn accepts_upper_bound() {
        let page = Page::new(Some(MAX_PAGE_LIMIT), Some(5)).expect("valid page");
        assert_eq!((page.limit(), page.offset()), (MAX_PAGE_LIMIT, 5));
    }
}

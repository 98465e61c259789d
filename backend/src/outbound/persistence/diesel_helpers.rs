//! Shared helpers for Diesel repository implementations.

use tracing::warn;

use crate::domain::Page;

/// `LIMIT`/`OFFSET` values for a validated page.
pub(crate) fn page_bounds(page: &Page) -> (i64, i64) {
    (i64::from(page.limit()), i64::from(page.offset()))
}

/// Case-insensitive substring pattern for `ILIKE`, escaping wildcards.
///
/// # Examples
/// ```ignore
/// assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
/// ```
pub(crate) fn like_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Log a stored row the domain rejected and return the message.
pub(crate) fn corrupt_row(table: &'static str, message: String) -> String {
    warn!(table, %message, "stored row failed domain validation");
    format!("corrupt {table} row: {message}")
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("news", "%news%")]
    #[case("  padded ", "%padded%")]
    #[case("50%_off", "%50\\%\\_off%")]
    #[case("back\\slash", "%back\\\\slash%")]
    fn like_patterns_escape_wildcards(#[case] search: &str, #[case] expected: &str) {
        assert_eq!(like_pattern(search), expected);
    }

    #[test]
    fn page_bounds_widen_to_i64() {
        let page = Page::new(Some(50), Some(100)).expect("valid page");
        assert_eq!(page_bounds(&page), (50, 100));
    }
}

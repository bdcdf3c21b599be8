pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

/// A bounded page: `page >= 1`, `per_page` in `1..=MAX_PER_PAGE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    /// Rows to skip; saturates for absurd page numbers so the query just returns nothing
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    /// Number of pages needed for `total` rows, rounding up
    pub fn page_count(&self, total: i64) -> i64 {
        if total <= 0 {
            return 0;
        }
        (total - 1) / self.per_page + 1
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_and_defaults() {
        let page = PageRequest::new(Some(0), Some(1000));
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, MAX_PER_PAGE);
        assert_eq!(page.offset(), 0);

        let page = PageRequest::default();
        assert_eq!(page.per_page, DEFAULT_PER_PAGE);

        let page = PageRequest::new(Some(3), Some(-5));
        assert_eq!(page.per_page, 1);
        assert_eq!(page.offset(), 2);
    }

    #[test]
    fn test_huge_page_offset_saturates() {
        let page = PageRequest::new(Some(i64::MAX), Some(100));
        assert_eq!(page.offset(), i64::MAX);
        assert_eq!(page.page_count(i64::MAX), i64::MAX / 100 + 1);
    }

    #[test]
    fn test_page_count_rounds_up() {
        let page = PageRequest::new(None, Some(20));
        assert_eq!(page.page_count(0), 0);
        assert_eq!(page.page_count(20), 1);
        assert_eq!(page.page_count(21), 2);
    }
}

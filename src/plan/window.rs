use crate::errors::ApiError;

/// Limit value meaning "no upper bound"
pub const UNBOUNDED: i64 = -1;

/// Pagination slice applied after filtering and sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: u64,
    /// Page size; `-1` is unbounded
    pub limit: i64,
}

impl Window {
    /// Exclusive end offset, `None` when unbounded
    #[must_use]
    pub fn end(&self) -> Option<u64> {
        self.take().map(|take| self.start.saturating_add(take))
    }

    /// Number of items to fetch, `None` when unbounded
    #[must_use]
    pub fn take(&self) -> Option<u64> {
        u64::try_from(self.limit).ok()
    }

    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        self.limit != UNBOUNDED
    }

    /// Apply `[start:end]` to an already materialized sequence.
    #[must_use]
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        let skip = usize::try_from(self.start).unwrap_or(usize::MAX);
        let iter = items.into_iter().skip(skip);
        match self.take().and_then(|take| usize::try_from(take).ok()) {
            Some(take) => iter.take(take).collect(),
            None => iter.collect(),
        }
    }
}

/// Resolve `_start`, `_page` and `_limit` into a window.
///
/// `_page` counts from zero and only applies when `limit > 0`.
///
/// # Errors
///
/// Returns `BadRequest` when both `start` and `page` are given, or when the
/// resolved start is negative or the limit is below `-1`.
pub fn resolve_window(
    start: Option<i64>,
    page: Option<i64>,
    limit: i64,
) -> Result<Window, ApiError> {
    let start = match (start, page) {
        (Some(_), Some(_)) => {
            return Err(ApiError::bad_request(
                "Can not specify _start and _page at the same time",
            ));
        }
        (Some(start), None) => start,
        (None, Some(page)) if limit > 0 => page
            .checked_mul(limit)
            .ok_or_else(|| ApiError::bad_request("_page is out of range"))?,
        (None, _) => 0,
    };

    if limit < UNBOUNDED || start < 0 {
        return Err(ApiError::bad_request(
            "_limit/_page or _limit/_start can not be < 0",
        ));
    }

    Ok(Window {
        start: start.unsigned_abs(),
        limit,
    })
}

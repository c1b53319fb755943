//! Page slicing over an already ordered result set.
//!
//! # Invariants
//! - The slice for page `p` of size `s` is `[p*s, p*s+s)` clamped to the input.
//! - `has_next == (p + 1) * s < total`, `has_previous == p > 0`.
//! - Arithmetic saturates; oversized page indexes yield empty pages, never
//!   panics.

use crate::model::query::PageInfo;
use crate::model::validation::ValidationError;

/// Validated page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: i64,
    size: i64,
}

impl PageRequest {
    /// # Errors
    /// - `NegativePage` when `page < 0`.
    /// - `NonPositivePageSize` when `size <= 0`.
    pub fn new(page: i64, size: i64) -> Result<Self, ValidationError> {
        if page < 0 {
            return Err(ValidationError::NegativePage(page));
        }
        if size <= 0 {
            return Err(ValidationError::NonPositivePageSize(size));
        }
        Ok(Self { page, size })
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn size(&self) -> i64 {
        self.size
    }
}

/// Returns the requested slice of `ordered` and its page metadata.
pub fn paginate<T: Clone>(ordered: &[T], request: PageRequest) -> (Vec<T>, PageInfo) {
    let total = ordered.len();
    let page = u64::try_from(request.page).unwrap_or(0);
    let size = u64::try_from(request.size).unwrap_or(1);

    let start = usize::try_from(page.saturating_mul(size))
        .unwrap_or(usize::MAX)
        .min(total);
    let end = usize::try_from(size)
        .unwrap_or(usize::MAX)
        .saturating_add(start)
        .min(total);

    let total_i64 = i64::try_from(total).unwrap_or(i64::MAX);
    let next_start = (i128::from(request.page) + 1) * i128::from(request.size);
    let info = PageInfo {
        total: total_i64,
        page: request.page,
        size: request.size,
        has_next: next_start < i128::from(total_i64),
        has_previous: request.page > 0,
    };
    (ordered[start..end].to_vec(), info)
}

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Pagination options for retrieving lists of items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageOpts {
    /// The maximum number of items to return
    pub limit: usize,
    /// The starting point for pagination, as returned in [`PageResult::next_cursor`]
    pub cursor: Option<String>,
}

impl Default for PageOpts {
    fn default() -> Self {
        PageOpts {
            limit: 100,
            cursor: None,
        }
    }
}

impl PageOpts {
    pub fn new(limit: usize, cursor: Option<String>) -> Self {
        PageOpts { limit, cursor }
    }

    fn offset(&self) -> Result<usize> {
        match &self.cursor {
            None => Ok(0),
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| Error::InvalidPredicate(format!("invalid page cursor '{}'", cursor))),
        }
    }
}

/// Result of a paginated query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult<T> {
    /// The items returned in this page
    pub items: Vec<T>,
    /// The total number of items available
    pub total: usize,
    /// Cursor for retrieving the next page, if available
    pub next_cursor: Option<String>,
}

impl<T> PageResult<T> {
    pub fn new(items: Vec<T>, total: usize, next_cursor: Option<String>) -> Self {
        PageResult {
            items,
            total,
            next_cursor,
        }
    }
}

/// Cuts one page out of an already ordered result list.
pub fn paginate<T>(items: Vec<T>, opts: &PageOpts) -> Result<PageResult<T>> {
    let total = items.len();
    let start = opts.offset()?.min(total);
    let end = start.saturating_add(opts.limit).min(total);

    let next_cursor = if end < total {
        Some(end.to_string())
    } else {
        None
    };

    let page = items.into_iter().skip(start).take(end - start).collect();
    Ok(PageResult::new(page, total, next_cursor))
}

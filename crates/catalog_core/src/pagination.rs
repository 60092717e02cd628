//! Pagination coordinator for list endpoints.
//!
//! # Responsibility
//! - Parse `page`/`size` request parameters into a [`PageRequest`].
//! - Issue the total-count query and the page query together and attach
//!   `{page, size, totalCount}` once both complete.
//!
//! # Invariants
//! - `page` is 1-based. [`PageRequest::from_params`] clamps page and size to
//!   at least 1; [`paginate`] trusts its request and never re-clamps.

use crate::model::document::Document;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;

pub const PAGE: &str = "page";
pub const SIZE: &str = "size";

/// Requested page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }

    /// Removes `page` and `size` from `params`; what remains are filters.
    ///
    /// Missing or unparsable values fall back to page 1 and `default_size`.
    pub fn from_params(params: &mut Document, default_size: u32) -> Self {
        let page = params.remove(PAGE).as_ref().and_then(read_u32).unwrap_or(1);
        let size = params
            .remove(SIZE)
            .as_ref()
            .and_then(read_u32)
            .unwrap_or(default_size);
        Self::new(page.max(1), size.max(1))
    }

    /// Rows to skip: `(page - 1) * size`.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.size)
    }

    pub fn limit(&self) -> u32 {
        self.size
    }
}

/// Page metadata attached to list replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub size: u32,
    pub total_count: i64,
}

/// List reply: `{data, pagination}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

/// Awaits the count and page futures together; the first failure wins.
///
/// Both futures are polled from the calling task, so their I/O overlaps
/// while their continuations stay on this task.
pub async fn paginate<T, E, C, P>(request: PageRequest, count: C, page: P) -> Result<Page<T>, E>
where
    C: Future<Output = Result<i64, E>>,
    P: Future<Output = Result<Vec<T>, E>>,
{
    let (total_count, data) = tokio::try_join!(count, page)?;
    Ok(Page {
        data,
        pagination: Pagination {
            page: request.page,
            size: request.size,
            total_count,
        },
    })
}

fn read_u32(value: &Value) -> Option<u32> {
    let int = match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f as i64))?,
        Value::String(text) => text.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    Some(int.clamp(0, i64::from(u32::MAX)) as u32)
}

#[cfg(test)]
mod tests {
    use super::{paginate, PageRequest, Pagination};
    use crate::model::document::Document;
    use serde_json::json;

    #[test]
    fn second_page_of_ten_skips_first_ten_rows() {
        let request = PageRequest::new(2, 10);
        assert_eq!(request.offset(), 10);
        assert_eq!(request.limit(), 10);
    }

    #[test]
    fn from_params_removes_window_and_clamps() {
        let mut params: Document = json!({"page": "0", "size": -5, "sku": "A1"})
            .as_object()
            .cloned()
            .unwrap();
        let request = PageRequest::from_params(&mut params, 100);
        assert_eq!(request, PageRequest::new(1, 1));
        assert_eq!(params.len(), 1);
        assert!(params.contains_key("sku"));
    }

    #[test]
    fn from_params_uses_defaults_when_absent() {
        let mut params = Document::new();
        assert_eq!(
            PageRequest::from_params(&mut params, 1000),
            PageRequest::new(1, 1000)
        );
    }

    #[tokio::test]
    async fn paginate_attaches_metadata() {
        let page = paginate(
            PageRequest::new(2, 10),
            async { Ok::<_, String>(25) },
            async { Ok::<_, String>(vec![11, 12]) },
        )
        .await
        .unwrap();
        assert_eq!(
            page.pagination,
            Pagination {
                page: 2,
                size: 10,
                total_count: 25
            }
        );
        assert_eq!(
            serde_json::to_value(page.pagination).unwrap(),
            json!({"page": 2, "size": 10, "totalCount": 25})
        );
    }

    #[tokio::test]
    async fn paginate_fails_when_either_side_fails() {
        let result = paginate(
            PageRequest::new(1, 10),
            async { Err::<i64, _>("count failed".to_string()) },
            async { Ok::<Vec<i32>, String>(Vec::new()) },
        )
        .await;
        assert_eq!(result.unwrap_err(), "count failed");
    }
}

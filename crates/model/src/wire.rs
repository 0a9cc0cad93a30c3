//! Response envelope and pagination types of the remote store contract.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every remote response: `{success, data, message}`.
///
/// `success == false` is a domain answer (not found, rejected), never a
/// transport failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn ok_empty() -> Self {
        Self {
            success: true,
            data: None,
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }

    /// The payload, only when the call succeeded.
    pub fn into_data(self) -> Option<T> {
        if self.success {
            self.data
        } else {
            None
        }
    }

    /// The message, or `fallback` when the store sent none.
    pub fn message_or(&self, fallback: &str) -> String {
        self.message
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            success: self.success,
            data: self.data.map(f),
            message: self.message,
        }
    }
}

/// One page of a list response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    #[serde(default)]
    pub total_count: usize,
    #[serde(default = "Vec::new")]
    pub list: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(total_count: usize, list: Vec<T>) -> Self {
        Self { total_count, list }
    }
}

/// Invalid pagination arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PageError {
    #[error("pageNo must be at least 1 (got {0})")]
    InvalidPageNo(u32),
    #[error("pageSize must be at least 1 (got {0})")]
    InvalidPageSize(u32),
}

/// Pagination arguments for list operations; both values are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    page_no: u32,
    page_size: u32,
}

impl PageRequest {
    /// Validate and build a page request.
    ///
    /// ```
    /// use toolgraph_model::{PageError, PageRequest};
    ///
    /// assert!(PageRequest::new(1, 20).is_ok());
    /// assert_eq!(PageRequest::new(0, 20), Err(PageError::InvalidPageNo(0)));
    /// assert_eq!(PageRequest::new(1, 0), Err(PageError::InvalidPageSize(0)));
    /// ```
    pub fn new(page_no: u32, page_size: u32) -> Result<Self, PageError> {
        if page_no < 1 {
            return Err(PageError::InvalidPageNo(page_no));
        }
        if page_size < 1 {
            return Err(PageError::InvalidPageSize(page_size));
        }
        Ok(Self { page_no, page_size })
    }

    /// First page of the given size; a zero size is raised to 1.
    pub fn first(page_size: u32) -> Self {
        Self {
            page_no: 1,
            page_size: page_size.max(1),
        }
    }

    pub fn next(self) -> Self {
        Self {
            page_no: self.page_no.saturating_add(1),
            page_size: self.page_size,
        }
    }

    pub fn page_no(&self) -> u32 {
        self.page_no
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Zero-based index of the first item on this page.
    pub fn offset(&self) -> usize {
        (self.page_no as usize - 1) * self.page_size as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_failure_parses_without_data() {
        let env: Envelope<u64> =
            serde_json::from_value(json!({"success": false, "message": "not found"})).unwrap();
        assert!(!env.success);
        assert_eq!(env.message_or("fallback"), "not found");
        assert_eq!(env.into_data(), None);
    }

    #[test]
    fn envelope_null_data_is_none() {
        let env: Envelope<u64> =
            serde_json::from_value(json!({"success": true, "data": null, "message": null}))
                .unwrap();
        assert!(env.success);
        assert_eq!(env.message_or("ok"), "ok");
        assert_eq!(env.data, None);
    }

    #[test]
    fn into_data_drops_payload_of_failed_call() {
        let env = Envelope {
            success: false,
            data: Some(7u64),
            message: None,
        };
        assert_eq!(env.into_data(), None);
    }

    #[test]
    fn page_parses_camel_case() {
        let page: Page<u64> =
            serde_json::from_value(json!({"totalCount": 3, "list": [1, 2]})).unwrap();
        assert_eq!(page.total_count, 3);
        assert_eq!(page.list, vec![1, 2]);
    }

    #[test]
    fn page_request_serializes_as_query_params() {
        let req = PageRequest::new(2, 50).unwrap();
        let value = serde_json::to_value(req).unwrap();
        assert_eq!(value, json!({"pageNo": 2, "pageSize": 50}));
        assert_eq!(req.offset(), 50);
        assert_eq!(req.next().page_no(), 3);
    }

    #[test]
    fn first_page_never_has_zero_size() {
        assert_eq!(PageRequest::first(0).page_size(), 1);
    }
}

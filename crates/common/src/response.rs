//! Standard REST response envelopes.
//!
//! ```text
//! single: {"data": T}
//! list:   {"data": [T], "meta": {"total", "limit", "offset"}}
//! batch:  {"data": [T], "count": n}
//! ```

use serde::{Deserialize, Serialize};

/// `{"data": T}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Pagination metadata for list responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListMeta {
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

/// `{"data": [T], "meta": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub meta: ListMeta,
}

/// `{"data": [T], "count": n}`
///
/// Element order is not guaranteed to follow the request; callers re-key by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse<T> {
    pub data: Vec<T>,
    pub count: usize,
}

impl<T> BatchResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        let count = data.len();
        Self { data, count }
    }
}

/// Body of `POST /api/v1/{resource}/batch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub ids: Vec<String>,
}

use std::convert::Infallible;

use rocket::request::{self, FromRequest, Request};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MIN_PAGE_SIZE: u64 = 5;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Requested page of a listing, from the `page` and `per_page` query parameters.
/// Bad values fall back to defaults rather than failing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: u64,
    per_page: u64,
}

impl Pagination {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Self {
        let page = page.filter(|&page| page >= 1).unwrap_or(1) as u64;
        let per_page = per_page
            .map(|size| size.clamp(MIN_PAGE_SIZE as i64, MAX_PAGE_SIZE as i64) as u64)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        Self { page, per_page }
    }

    /// Fit the requested page to a listing of `total` items.
    pub fn resolve(self, total: u64) -> PageInfo {
        let total_pages = total.div_ceil(self.per_page).max(1);
        PageInfo {
            page: self.page.min(total_pages),
            per_page: self.per_page,
            total,
            total_pages,
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Pagination {
    type Error = Infallible;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let page = req.query_value::<i64>("page").and_then(Result::ok);
        let per_page = req.query_value::<i64>("per_page").and_then(Result::ok);
        request::Outcome::Success(Self::new(page, per_page))
    }
}

/// The page actually served, as reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl PageInfo {
    /// Number of items before this page.
    pub fn skip(&self) -> u64 {
        (self.page - 1) * self.per_page
    }
}

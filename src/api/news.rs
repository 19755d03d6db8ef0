//! News search with "load more" pagination.
//!
//! All pages of one search share a single cache entry; each fetched page is
//! appended to the aggregate, skipping articles whose URL is already there.

use lexquery_api_types::{Article, NewsResponse};
use serde::Serialize;
use serde_json::{Value, json};

use crate::cache::{AppendUnique, FingerprintError, MergePolicy, Paginated, Tag};
use crate::transport::{ApiRequest, FetchError};

use super::{QueryEndpoint, decode_json};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsQuery {
    pub q: String,
    pub page: u32,
    pub page_size: u32,
}

impl NewsQuery {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// The query for the page after this one.
    pub fn next_page(&self) -> Self {
        self.clone().page(self.page + 1)
    }
}

/// `fetchNews(q, page, pageSize)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchNews;

impl QueryEndpoint for FetchNews {
    type Args = NewsQuery;
    type Output = Paginated<Article>;

    const NAME: &'static str = "fetchNews";

    fn request(&self, query: &NewsQuery) -> Result<ApiRequest, FetchError> {
        Ok(ApiRequest::get("news")
            .with_query("q", &query.q)
            .with_query("page", query.page)
            .with_query("pageSize", query.page_size))
    }

    fn decode(&self, payload: Value) -> Result<Paginated<Article>, FetchError> {
        let page: NewsResponse = decode_json(Self::NAME, payload)?;
        Ok(Paginated::new(page.articles, page.total_results))
    }

    fn provides(&self, _query: &NewsQuery, _page: &Paginated<Article>) -> Vec<Tag> {
        vec![Tag::id("News", "LIST")]
    }

    fn cache_args(&self, query: &NewsQuery) -> Result<Value, FingerprintError> {
        Ok(json!({ "q": query.q, "page_size": query.page_size }))
    }

    fn merge(
        &self,
        previous: Option<&Paginated<Article>>,
        next: Paginated<Article>,
    ) -> Paginated<Article> {
        AppendUnique::by(|article: &Article| article.url.clone()).merge(previous, next)
    }
}

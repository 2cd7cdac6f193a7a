//! Lazy pagination over Google list endpoints
//!
//! A page is requested only when the caller has consumed the previous one,
//! so stopping early issues no further requests.

use futures::stream::{self, Stream};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::VecDeque;
use std::marker::PhantomData;

use janitor_core::{Error, Result};

use crate::client::ApiClient;

/// Query parameter carrying the continuation token
pub const PAGE_TOKEN_PARAM: &str = "pageToken";

/// Response field holding the next continuation token
pub const NEXT_PAGE_TOKEN_FIELD: &str = "nextPageToken";

/// Yields raw JSON pages, following continuation tokens
#[derive(Debug)]
pub struct Paginator {
    client: ApiClient,
    method: Method,
    url: String,
    params: Vec<(String, String)>,
    token_field: String,
    next_token: Option<String>,
    exhausted: bool,
    pages_fetched: usize,
}

impl Paginator {
    /// Page through `url` with `method`; the token always travels as a
    /// query parameter
    pub fn new(
        client: ApiClient,
        method: Method,
        url: impl Into<String>,
        params: Vec<(String, String)>,
    ) -> Self {
        Self {
            client,
            method,
            url: url.into(),
            params,
            token_field: NEXT_PAGE_TOKEN_FIELD.to_string(),
            next_token: None,
            exhausted: false,
            pages_fetched: 0,
        }
    }

    /// Read the continuation token from a different response field
    pub fn with_token_field(mut self, field: impl Into<String>) -> Self {
        self.token_field = field.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Fetch the next page, or `None` after the last one
    ///
    /// A failed fetch leaves the paginator where it was; calling again
    /// requests the same page.
    pub async fn next_page(&mut self) -> Result<Option<Value>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut params = self.params.clone();
        if let Some(token) = &self.next_token {
            params.push((PAGE_TOKEN_PARAM.to_string(), token.clone()));
        }

        let page: Value = self
            .client
            .request(self.method.clone(), &self.url, None, &params)
            .await?
            .json()?;
        self.pages_fetched += 1;

        self.next_token = page
            .get(&self.token_field)
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(str::to_string);
        self.exhausted = self.next_token.is_none();

        Ok(Some(page))
    }
}

/// Typed items drawn from a field of each page
#[derive(Debug)]
pub struct Items<T> {
    pages: Paginator,
    items_field: String,
    buffer: VecDeque<Value>,
    _item: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Items<T> {
    pub fn new(pages: Paginator, items_field: impl Into<String>) -> Self {
        Self {
            pages,
            items_field: items_field.into(),
            buffer: VecDeque::new(),
            _item: PhantomData,
        }
    }

    pub fn with_token_field(mut self, field: impl Into<String>) -> Self {
        self.pages = self.pages.with_token_field(field);
        self
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages.pages_fetched()
    }

    /// The next item, fetching a page when the buffer runs dry
    ///
    /// # Errors
    ///
    /// API client errors unchanged; `Error::MalformedState` if an item does
    /// not decode or the items field is not a list.
    pub async fn try_next(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(raw) = self.buffer.pop_front() {
                return serde_json::from_value(raw).map(Some).map_err(|e| {
                    Error::malformed(format!("unexpected item from {}: {}", self.pages.url(), e))
                });
            }

            let Some(mut page) = self.pages.next_page().await? else {
                return Ok(None);
            };

            match page.get_mut(&self.items_field).map(Value::take) {
                Some(Value::Array(items)) => self.buffer.extend(items),
                // Google omits the field on empty pages
                None | Some(Value::Null) => {}
                Some(other) => {
                    return Err(Error::malformed(format!(
                        "field {:?} from {} is not a list: {}",
                        self.items_field,
                        self.pages.url(),
                        other
                    )))
                }
            }
        }
    }

    /// Drain every page into a vector
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.try_next().await? {
            items.push(item);
        }
        Ok(items)
    }

    /// Adapt into a `Stream`; pages are still fetched on demand
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> + Send
    where
        T: Send + 'static,
    {
        stream::try_unfold(self, |mut items| async move {
            Ok(items.try_next().await?.map(|item| (item, items)))
        })
    }
}

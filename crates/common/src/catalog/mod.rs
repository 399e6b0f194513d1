//! Catalog client abstraction
//!
//! Translates the five logical lookups into GraphQL calls against the remote
//! catalog, bounds concurrent in-flight requests, retries author lookups,
//! and memoizes results for the lifetime of the process run.
//!
//! The client never raises to its caller: a failed call (non-2xx status,
//! transport error, malformed payload) is logged, counted, and collapsed to
//! an empty result so enrichment can proceed with partial information.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::cache::{CacheKind, CatalogCache};
use crate::config::CatalogConfig;
use crate::errors::{AppError, Result};
use crate::metrics::record_catalog_lookup;
use crate::models::BookRecord;
use crate::retry::RetryPolicy;

/// Glyphs stripped from titles before a search query
const QUOTE_GLYPHS: [char; 7] = ['«', '»', '“', '”', '„', '‟', '"'];

/// Remove quotation glyphs from a title and trim the remainder
pub fn strip_quote_glyphs(title: &str) -> String {
    title
        .chars()
        .filter(|c| !QUOTE_GLYPHS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Capability set exposed by the remote catalog
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Active books for an author, capped at 10
    async fn books_by_author(&self, author_uuid: &str) -> Vec<BookRecord>;

    /// Slug fallback when the uuid lookup path is unavailable; single
    /// attempt, uncached
    async fn books_by_author_slug(&self, author_slug: &str) -> Vec<BookRecord>;

    /// Direct lookup, used to backfill a missing cover
    async fn book_by_uuid(&self, book_uuid: &str) -> Option<BookRecord>;

    /// Title search, optionally broadened with an "author title" variant
    async fn search_books_by_title(
        &self,
        title: &str,
        author_name: Option<&str>,
    ) -> Vec<BookRecord>;

    /// Books carrying a tag, capped at 6
    async fn books_by_tag(&self, tag: &str) -> Vec<BookRecord>;

    /// Books in a category, capped at 6
    async fn books_by_category(&self, category_uuid: &str) -> Vec<BookRecord>;
}

const BOOKS_BY_AUTHOR_QUERY: &str = r#"
query BooksByAuthor($authorUuid: String!) {
  books(body: { authors: [$authorUuid], isActive: true, limit: 10 }) {
    uuid
    name
    slug
    annotation
    image { url }
  }
}
"#;

const BOOKS_BY_AUTHOR_SLUG_QUERY: &str = r#"
query BooksByAuthorSlug($authorSlug: String!) {
  books(body: { authorsSlugs: [$authorSlug], isActive: true, limit: 6 }) {
    uuid
    name
    slug
    annotation
    image { url }
  }
}
"#;

const BOOK_BY_UUID_QUERY: &str = r#"
query BookByUuid($bookUuid: String!) {
  books(body: { uuids: [$bookUuid], isActive: true, limit: 1 }) {
    uuid
    name
    slug
    annotation
    image { url }
  }
}
"#;

const SEARCH_BOOKS_QUERY: &str = r#"
query SearchBooks($names: [String!]!) {
  books(body: { names: $names, isActive: true, limit: 6 }) {
    uuid
    name
    slug
    annotation
    image { url }
  }
}
"#;

const BOOKS_BY_TAG_QUERY: &str = r#"
query BooksByTag($tagSlug: String!) {
  tags(body: { slugs: [$tagSlug] }) {
    uuid
    name
    books(limit: 6) {
      uuid
      name
      slug
      annotation
      image { url }
    }
  }
}
"#;

const BOOKS_BY_CATEGORY_QUERY: &str = r#"
query BooksByCategory($categoryUuid: String!) {
  category(body: { uuid: $categoryUuid }) {
    uuid
    name
    books(limit: 6) {
      uuid
      name
      slug
      annotation
      image { url }
    }
  }
}
"#;

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize, Default)]
struct BooksData {
    #[serde(default)]
    books: Vec<BookRecord>,
}

#[derive(Deserialize, Default)]
struct TagsData {
    #[serde(default)]
    tags: Vec<TagNode>,
}

#[derive(Deserialize)]
struct TagNode {
    #[serde(default)]
    books: Vec<BookRecord>,
}

#[derive(Deserialize, Default)]
struct CategoryData {
    category: Option<CategoryNode>,
}

#[derive(Deserialize)]
struct CategoryNode {
    #[serde(default)]
    books: Vec<BookRecord>,
}

/// Why an author lookup attempt is retried
#[derive(Debug, Error)]
enum AuthorLookup {
    #[error("empty result")]
    Empty,
    #[error(transparent)]
    Failed(#[from] AppError),
}

/// GraphQL catalog client over HTTP
pub struct HttpCatalog {
    client: reqwest::Client,
    endpoint: String,
    gate: Semaphore,
    cache: Arc<CatalogCache>,
    author_retry: RetryPolicy,
}

impl HttpCatalog {
    pub fn new(config: &CatalogConfig, cache: Arc<CatalogCache>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            gate: Semaphore::new(config.max_concurrent.max(1)),
            cache,
            author_retry: config.author_retry_policy(),
        })
    }

    /// POST a query under the shared concurrency gate
    async fn post<T: DeserializeOwned + Default>(
        &self,
        lookup: &'static str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| AppError::Internal {
                message: "catalog concurrency gate closed".to_string(),
            })?;

        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            record_catalog_lookup(lookup, "error");
            return Err(AppError::Catalog {
                message: format!("{} returned status {}", lookup, status),
            });
        }

        let body: GraphQlResponse<T> = response.json().await?;
        if !body.errors.is_empty() {
            let messages: Vec<&str> = body.errors.iter().map(|e| e.message.as_str()).collect();
            warn!(lookup, errors = ?messages, "Catalog responded with errors");
        }

        record_catalog_lookup(lookup, "ok");
        Ok(body.data.unwrap_or_default())
    }

    async fn fetch_books_by_author(&self, author_uuid: &str) -> Result<Vec<BookRecord>> {
        let data: BooksData = self
            .post(
                "books_by_author",
                BOOKS_BY_AUTHOR_QUERY,
                json!({ "authorUuid": author_uuid }),
            )
            .await?;
        Ok(data.books)
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    async fn books_by_author(&self, author_uuid: &str) -> Vec<BookRecord> {
        if let Some(cached) = self.cache.get(CacheKind::BooksByAuthor, author_uuid).await {
            return cached;
        }

        // Empty results are retried: the upstream catalog is eventually
        // consistent and an author may surface a few seconds late.
        let result = self
            .author_retry
            .run(
                "books_by_author",
                move || async move {
                    let books = self.fetch_books_by_author(author_uuid).await?;
                    if books.is_empty() {
                        Err(AuthorLookup::Empty)
                    } else {
                        Ok(books)
                    }
                },
                |_| true,
            )
            .await;

        let books = match result {
            Ok(books) => books,
            Err(AuthorLookup::Empty) => {
                debug!(author_uuid, "No books for author after retries");
                Vec::new()
            }
            Err(AuthorLookup::Failed(err)) => {
                error!(author_uuid, error = %err, "Author lookup failed");
                Vec::new()
            }
        };

        // Cache the empty case too, so a permanently-absent author is not
        // re-fetched within this run.
        self.cache
            .insert(CacheKind::BooksByAuthor, author_uuid, books.clone())
            .await;
        books
    }

    async fn books_by_author_slug(&self, author_slug: &str) -> Vec<BookRecord> {
        match self
            .post::<BooksData>(
                "books_by_author_slug",
                BOOKS_BY_AUTHOR_SLUG_QUERY,
                json!({ "authorSlug": author_slug }),
            )
            .await
        {
            Ok(data) => data.books,
            Err(err) => {
                error!(author_slug, error = %err, "Author slug lookup failed");
                Vec::new()
            }
        }
    }

    async fn book_by_uuid(&self, book_uuid: &str) -> Option<BookRecord> {
        if let Some(cached) = self.cache.get(CacheKind::BookByUuid, book_uuid).await {
            return cached.into_iter().next();
        }

        let books = match self
            .post::<BooksData>(
                "book_by_uuid",
                BOOK_BY_UUID_QUERY,
                json!({ "bookUuid": book_uuid }),
            )
            .await
        {
            Ok(data) => data.books,
            Err(err) => {
                warn!(book_uuid, error = %err, "Book lookup failed");
                return None;
            }
        };

        self.cache
            .insert(CacheKind::BookByUuid, book_uuid, books.clone())
            .await;
        books.into_iter().next()
    }

    async fn search_books_by_title(
        &self,
        title: &str,
        author_name: Option<&str>,
    ) -> Vec<BookRecord> {
        let clean_title = strip_quote_glyphs(title);

        // Query both the bare title and an "author title" variant to broaden
        // the match probability.
        let mut names = vec![clean_title.clone()];
        if let Some(author) = author_name {
            names.push(format!("{} {}", author, clean_title));
        }

        match self
            .post::<BooksData>("search_books", SEARCH_BOOKS_QUERY, json!({ "names": names }))
            .await
        {
            Ok(data) => {
                debug!(title = %clean_title, found = data.books.len(), "Title search complete");
                data.books
            }
            Err(err) => {
                error!(title = %clean_title, error = %err, "Title search failed");
                Vec::new()
            }
        }
    }

    async fn books_by_tag(&self, tag: &str) -> Vec<BookRecord> {
        if let Some(cached) = self.cache.get(CacheKind::BooksByTag, tag).await {
            return cached;
        }

        let books = match self
            .post::<TagsData>("books_by_tag", BOOKS_BY_TAG_QUERY, json!({ "tagSlug": tag }))
            .await
        {
            Ok(data) => data
                .tags
                .into_iter()
                .next()
                .map(|t| t.books)
                .unwrap_or_default(),
            Err(err) => {
                error!(tag, error = %err, "Tag lookup failed");
                Vec::new()
            }
        };

        self.cache
            .insert(CacheKind::BooksByTag, tag, books.clone())
            .await;
        books
    }

    async fn books_by_category(&self, category_uuid: &str) -> Vec<BookRecord> {
        if let Some(cached) = self
            .cache
            .get(CacheKind::BooksByCategory, category_uuid)
            .await
        {
            return cached;
        }

        let books = match self
            .post::<CategoryData>(
                "books_by_category",
                BOOKS_BY_CATEGORY_QUERY,
                json!({ "categoryUuid": category_uuid }),
            )
            .await
        {
            Ok(data) => data.category.map(|c| c.books).unwrap_or_default(),
            Err(err) => {
                error!(category_uuid, error = %err, "Category lookup failed");
                Vec::new()
            }
        };

        self.cache
            .insert(CacheKind::BooksByCategory, category_uuid, books.clone())
            .await;
        books
    }
}

/// Scripted catalog for tests; records every lookup
#[derive(Default)]
pub struct MockCatalog {
    by_author: HashMap<String, Vec<BookRecord>>,
    by_author_slug: HashMap<String, Vec<BookRecord>>,
    by_uuid: HashMap<String, BookRecord>,
    by_tag: HashMap<String, Vec<BookRecord>>,
    by_category: HashMap<String, Vec<BookRecord>>,
    search_results: Vec<BookRecord>,
    calls: std::sync::Mutex<Vec<(String, String)>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_author_books(mut self, author_uuid: &str, books: Vec<BookRecord>) -> Self {
        self.by_author.insert(author_uuid.to_string(), books);
        self
    }

    pub fn with_author_slug_books(mut self, slug: &str, books: Vec<BookRecord>) -> Self {
        self.by_author_slug.insert(slug.to_string(), books);
        self
    }

    pub fn with_book(mut self, book: BookRecord) -> Self {
        self.by_uuid.insert(book.uuid.clone(), book);
        self
    }

    pub fn with_tag_books(mut self, tag: &str, books: Vec<BookRecord>) -> Self {
        self.by_tag.insert(tag.to_string(), books);
        self
    }

    pub fn with_category_books(mut self, category: &str, books: Vec<BookRecord>) -> Self {
        self.by_category.insert(category.to_string(), books);
        self
    }

    pub fn with_search_results(mut self, books: Vec<BookRecord>) -> Self {
        self.search_results = books;
        self
    }

    /// All recorded lookups as (lookup, key) pairs, in call order
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("mock lock poisoned").clone()
    }

    /// Number of recorded lookups of one kind
    pub fn call_count(&self, lookup: &str) -> usize {
        self.calls().iter().filter(|(l, _)| l == lookup).count()
    }

    fn record(&self, lookup: &str, key: &str) {
        self.calls
            .lock()
            .expect("mock lock poisoned")
            .push((lookup.to_string(), key.to_string()));
    }
}

#[async_trait]
impl Catalog for MockCatalog {
    async fn books_by_author(&self, author_uuid: &str) -> Vec<BookRecord> {
        self.record("books_by_author", author_uuid);
        self.by_author.get(author_uuid).cloned().unwrap_or_default()
    }

    async fn books_by_author_slug(&self, author_slug: &str) -> Vec<BookRecord> {
        self.record("books_by_author_slug", author_slug);
        self.by_author_slug
            .get(author_slug)
            .cloned()
            .unwrap_or_default()
    }

    async fn book_by_uuid(&self, book_uuid: &str) -> Option<BookRecord> {
        self.record("book_by_uuid", book_uuid);
        self.by_uuid.get(book_uuid).cloned()
    }

    async fn search_books_by_title(
        &self,
        title: &str,
        _author_name: Option<&str>,
    ) -> Vec<BookRecord> {
        self.record("search_books", title);
        self.search_results.clone()
    }

    async fn books_by_tag(&self, tag: &str) -> Vec<BookRecord> {
        self.record("books_by_tag", tag);
        self.by_tag.get(tag).cloned().unwrap_or_default()
    }

    async fn books_by_category(&self, category_uuid: &str) -> Vec<BookRecord> {
        self.record("books_by_category", category_uuid);
        self.by_category
            .get(category_uuid)
            .cloned()
            .unwrap_or_default()
    }
}

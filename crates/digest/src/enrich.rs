//! Enrichment engine
//!
//! Produces a bounded, de-duplicated book list and a parallel list of
//! contextual links for one event, exhausting structured references before
//! falling back to a heuristic title search.
//!
//! Steps run in strict order and short-circuit once the book cap is
//! reached: pre-attached book references, quoted-title extraction, author
//! references, tag references, category references, then (only when
//! everything above produced nothing) one generic search.

use std::sync::{Arc, OnceLock};

use regex_lite::Regex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use almanac_common::catalog::{strip_quote_glyphs, Catalog};
use almanac_common::models::{
    BookCandidate, BookSource, ContextualLink, Event, LinkType, ReferenceType,
};

use crate::links::LinkBuilder;

/// Book cap for the structured path
pub const MAX_BOOKS: usize = 6;

/// Relaxed cap for the fallback search
const FALLBACK_MAX_BOOKS: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnrichError {
    #[error("event has no title")]
    MissingTitle,
}

/// Result of one enrichment run; never persisted
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub books: Vec<BookCandidate>,
    pub links: Vec<ContextualLink>,
}

/// Orchestrates catalog lookups for one event
pub struct Enricher {
    catalog: Arc<dyn Catalog>,
    links: LinkBuilder,
}

impl Enricher {
    pub fn new(catalog: Arc<dyn Catalog>, links: LinkBuilder) -> Self {
        Self { catalog, links }
    }

    #[instrument(skip(self, event), fields(event = %event.title))]
    pub async fn enrich(&self, event: &Event) -> Result<Enrichment, EnrichError> {
        if event.title.trim().is_empty() {
            return Err(EnrichError::MissingTitle);
        }

        let mut books: Vec<BookCandidate> = Vec::new();
        let mut links: Vec<ContextualLink> = Vec::new();

        self.collect_book_references(event, &mut books).await;
        self.collect_title_matches(event, &mut books).await;
        self.collect_author_references(event, &mut books, &mut links)
            .await;
        self.collect_tag_references(event, &mut books, &mut links)
            .await;
        self.collect_category_references(event, &mut books, &mut links)
            .await;

        if books.is_empty() && links.is_empty() {
            self.fallback_search(event, &mut books, &mut links).await;
        }

        debug!(
            books = books.len(),
            links = links.len(),
            "Enrichment complete"
        );
        Ok(Enrichment { books, links })
    }

    /// Step 1: accept book references already embedded in the event,
    /// backfilling missing covers from the catalog (the store's embedded
    /// metadata is often stale relative to the catalog).
    async fn collect_book_references(&self, event: &Event, books: &mut Vec<BookCandidate>) {
        for reference in event
            .references
            .iter()
            .filter(|r| r.reference_type == ReferenceType::Book)
        {
            if books.len() >= MAX_BOOKS {
                break;
            }

            let mut metadata = reference.metadata.clone();
            if !metadata.has_cover() {
                if let Some(uuid) = non_empty(reference.uuid.as_deref()) {
                    match self.catalog.book_by_uuid(uuid).await {
                        Some(api_book) => {
                            if api_book.image.as_ref().and_then(|i| i.best_url()).is_some() {
                                metadata.image = api_book.image;
                            } else {
                                warn!(book = %reference.name, "Catalog returned no cover");
                            }
                        }
                        None => warn!(book = %reference.name, "Book not found in catalog"),
                    }
                }
            }

            push_unique(
                books,
                MAX_BOOKS,
                BookCandidate {
                    uuid: reference.uuid.clone().filter(|u| !u.is_empty()),
                    name: display_name(&reference.name, "Без названия"),
                    slug: reference.slug.clone().filter(|s| !s.is_empty()),
                    metadata,
                    source: BookSource::Database,
                },
            );
        }
    }

    /// Step 2: a quoted substring in the title is treated as a book title,
    /// a capitalized word run outside the quotes as the author name.
    async fn collect_title_matches(&self, event: &Event, books: &mut Vec<BookCandidate>) {
        if books.len() >= MAX_BOOKS {
            return;
        }

        let hints = extract_title_hints(&event.title);
        let Some(book_title) = hints.book_title else {
            return;
        };
        debug!(book_title = %book_title, author = ?hints.author, "Extracted title hints");

        let found = self
            .catalog
            .search_books_by_title(&book_title, hints.author.as_deref())
            .await;
        for record in found {
            if books.len() >= MAX_BOOKS {
                break;
            }
            push_unique(
                books,
                MAX_BOOKS,
                record.into_candidate(BookSource::ApiSearch),
            );
        }
    }

    /// Step 3: author references produce a link each and their books
    async fn collect_author_references(
        &self,
        event: &Event,
        books: &mut Vec<BookCandidate>,
        links: &mut Vec<ContextualLink>,
    ) {
        for reference in event
            .references
            .iter()
            .filter(|r| r.reference_type == ReferenceType::Author)
        {
            if books.len() >= MAX_BOOKS {
                break;
            }

            if let Some(ident) = reference.link_identifier() {
                links.push(ContextualLink {
                    link_type: LinkType::Author,
                    name: display_name(&reference.name, "Автор"),
                    url: self.links.author(ident),
                });
            }

            let found = if let Some(uuid) = non_empty(reference.uuid.as_deref()) {
                self.catalog.books_by_author(uuid).await
            } else if let Some(slug) = non_empty(reference.slug.as_deref()) {
                self.catalog.books_by_author_slug(slug).await
            } else {
                continue;
            };

            for record in found {
                if books.len() >= MAX_BOOKS {
                    break;
                }
                push_unique(
                    books,
                    MAX_BOOKS,
                    record.into_candidate(BookSource::AuthorApi),
                );
            }
        }
    }

    /// Step 4: tag references
    async fn collect_tag_references(
        &self,
        event: &Event,
        books: &mut Vec<BookCandidate>,
        links: &mut Vec<ContextualLink>,
    ) {
        for reference in event
            .references
            .iter()
            .filter(|r| r.reference_type == ReferenceType::Tag)
        {
            if books.len() >= MAX_BOOKS {
                break;
            }

            let Some(ident) = non_empty(reference.uuid.as_deref())
                .or_else(|| non_empty(reference.slug.as_deref()))
            else {
                continue;
            };

            links.push(ContextualLink {
                link_type: LinkType::Tag,
                name: display_name(&reference.name, "Тег"),
                url: self.links.tag(ident),
            });

            let found = self.catalog.books_by_tag(ident).await;
            for record in found {
                if books.len() >= MAX_BOOKS {
                    break;
                }
                push_unique(books, MAX_BOOKS, record.into_candidate(BookSource::TagApi));
            }
        }
    }

    /// Step 5: category references
    async fn collect_category_references(
        &self,
        event: &Event,
        books: &mut Vec<BookCandidate>,
        links: &mut Vec<ContextualLink>,
    ) {
        for reference in event
            .references
            .iter()
            .filter(|r| r.reference_type == ReferenceType::Category)
        {
            if books.len() >= MAX_BOOKS {
                break;
            }

            let Some(ident) = non_empty(reference.uuid.as_deref())
                .or_else(|| non_empty(reference.slug.as_deref()))
            else {
                continue;
            };

            links.push(ContextualLink {
                link_type: LinkType::Category,
                name: display_name(&reference.name, "Категория"),
                url: self.links.category(ident),
            });

            let found = self.catalog.books_by_category(ident).await;
            for record in found {
                if books.len() >= MAX_BOOKS {
                    break;
                }
                push_unique(
                    books,
                    MAX_BOOKS,
                    record.into_candidate(BookSource::CategoryApi),
                );
            }
        }
    }

    /// Step 6: only when steps 1-5 produced nothing at all, synthesize a
    /// search link and try the full title.
    async fn fallback_search(
        &self,
        event: &Event,
        books: &mut Vec<BookCandidate>,
        links: &mut Vec<ContextualLink>,
    ) {
        let clean_title = strip_quote_glyphs(&event.title);
        info!("No structured references, falling back to title search");

        links.push(ContextualLink {
            link_type: LinkType::Search,
            name: clean_title.clone(),
            url: self.links.search(&clean_title),
        });

        let found = self.catalog.search_books_by_title(&event.title, None).await;
        for record in found {
            if books.len() >= FALLBACK_MAX_BOOKS {
                break;
            }
            push_unique(
                books,
                FALLBACK_MAX_BOOKS,
                record.into_candidate(BookSource::ApiSearch),
            );
        }
    }
}

/// Append a candidate unless the cap is reached or its uuid is already
/// present; the first-seen source wins.
fn push_unique(books: &mut Vec<BookCandidate>, cap: usize, candidate: BookCandidate) {
    if books.len() >= cap {
        return;
    }
    if let Some(uuid) = candidate.uuid.as_deref().filter(|u| !u.is_empty()) {
        if books.iter().any(|b| b.uuid.as_deref() == Some(uuid)) {
            return;
        }
    }
    books.push(candidate);
}

#[derive(Debug, Default, PartialEq, Eq)]
struct TitleHints {
    book_title: Option<String>,
    author: Option<String>,
}

fn quoted_title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"["«»“”„‟]([^"«»“”„‟]+)["«»“”„‟]"#).expect("quote regex is valid")
    })
}

fn author_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[А-ЯЁ][а-яё]+(?:\s+[А-ЯЁ][а-яё]+){1,2}").expect("author regex is valid")
    })
}

/// Pull a candidate book title (quoted substring) and author name
/// (capitalized 2-3 word run outside the quotes) out of an event title
fn extract_title_hints(title: &str) -> TitleHints {
    let book_title = quoted_title_regex()
        .captures(title)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty());

    let without_quotes = quoted_title_regex().replace_all(title, "");
    let author = author_run_regex()
        .find(&without_quotes)
        .map(|m| m.as_str().trim().to_string());

    TitleHints { book_title, author }
}

fn display_name(name: &str, fallback: &str) -> String {
    if name.trim().is_empty() {
        fallback.to_string()
    } else {
        name.to_string()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

//! Digest dispatcher
//!
//! Per-event state machine: enrich, format, choose media-group or
//! plain-text delivery, truncate captions without breaking markup, retry
//! transient failures, and pace successful sends. A failure in one event
//! never aborts the rest of the digest run.

use std::sync::{Arc, OnceLock};

use chrono::NaiveDate;
use regex_lite::Regex;
use tracing::{error, info, instrument, warn};

use almanac_common::config::DeliveryConfig;
use almanac_common::metrics::{record_delivery, record_event_outcome};
use almanac_common::models::{BookCandidate, Event};
use almanac_common::retry::RetryPolicy;
use almanac_common::transport::{MediaItem, SendError, Transport};

use crate::enrich::{Enricher, Enrichment};
use crate::format::{format_event_message, FormatOptions};
use crate::links::LinkBuilder;

/// Markup vocabulary the transport accepts
const MARKUP_TAGS: [&str; 6] = ["a", "b", "i", "u", "strong", "em"];

/// Safety margin reserved for closing tags and the ellipsis
const TRUNCATION_MARGIN: usize = 20;

/// A cut below this many characters is considered over-truncation
const MIN_CUT_CHARS: usize = 100;

const ELLIPSIS: &str = "...";

/// Covers per media batch
const MAX_MEDIA_ITEMS: usize = 6;

const NO_EVENTS_NOTICE: &str = "На этот день в календаре пока что нет событий.";

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<(/?)([a-z]+)[^>]*>").expect("tag regex is valid"))
}

fn char_count(s: &str) -> usize {
    s.chars().count()
}

fn byte_index_at_char(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(s.len())
}

/// Tags from the fixed vocabulary still open at the end of `fragment`,
/// in opening order
fn open_tags(fragment: &str) -> Vec<&'static str> {
    let mut stack: Vec<&'static str> = Vec::new();
    for caps in tag_regex().captures_iter(fragment) {
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let name = caps.get(2).map_or("", |m| m.as_str());
        let Some(tag) = MARKUP_TAGS.iter().find(|t| **t == name) else {
            continue;
        };
        if closing {
            if stack.last() == Some(tag) {
                stack.pop();
            }
        } else {
            stack.push(*tag);
        }
    }
    stack
}

/// One truncation pass at a given character budget
fn cut_at(message: &str, budget_chars: usize) -> String {
    let safe_cut = byte_index_at_char(message, budget_chars);
    let prefix = &message[..safe_cut];

    let cut: &str = if open_tags(prefix).is_empty() {
        prefix
    } else {
        // Prefer ending on the last complete closing tag, unless that would
        // throw away almost everything
        let mut last_close_end = 0usize;
        for tag in MARKUP_TAGS {
            let closer = format!("</{}>", tag);
            if let Some(pos) = prefix.rfind(&closer) {
                last_close_end = last_close_end.max(pos + closer.len());
            }
        }

        if last_close_end > 0 && char_count(&prefix[..last_close_end]) > MIN_CUT_CHARS {
            &prefix[..last_close_end]
        } else {
            match prefix.rfind(' ') {
                Some(space) if char_count(&prefix[..space]) > MIN_CUT_CHARS => &prefix[..space],
                _ => prefix,
            }
        }
    };

    // Never end inside a half-written tag
    let cut = match (cut.rfind('<'), cut.rfind('>')) {
        (Some(lt), Some(gt)) if lt > gt => &cut[..lt],
        (Some(lt), None) => &cut[..lt],
        _ => cut,
    };

    // Close whatever is still open in the kept prefix, in reverse-open order
    let mut result = cut.to_string();
    for tag in open_tags(cut).iter().rev() {
        result.push_str(&format!("</{}>", tag));
    }
    result.push_str(ELLIPSIS);
    result
}

/// Truncate a formatted message to the transport caption ceiling without
/// breaking markup: the output is at most `limit` characters and every tag
/// from the fixed vocabulary is balanced.
pub fn truncate_caption(message: &str, limit: usize) -> String {
    if char_count(message) <= limit {
        return message.to_string();
    }
    if limit <= ELLIPSIS.len() {
        return message.chars().take(limit).collect();
    }

    let mut budget = limit.saturating_sub(TRUNCATION_MARGIN);
    loop {
        let candidate = cut_at(message, budget);
        let overshoot = char_count(&candidate).saturating_sub(limit);
        if overshoot == 0 {
            return candidate;
        }
        if budget == 0 {
            return ELLIPSIS.to_string();
        }
        // Deeply nested markup can outgrow the margin; shrink and retry
        budget = budget.saturating_sub(overshoot.max(1));
    }
}

/// Terminal state of one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Failed,
    Skipped,
}

impl DispatchOutcome {
    fn as_str(self) -> &'static str {
        match self {
            DispatchOutcome::Sent => "sent",
            DispatchOutcome::Failed => "failed",
            DispatchOutcome::Skipped => "skipped",
        }
    }
}

/// Outcome counts for one digest run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DigestSummary {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Sends enriched events through the messaging transport
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    enricher: Enricher,
    links: LinkBuilder,
    delivery: DeliveryConfig,
    retry: RetryPolicy,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        enricher: Enricher,
        links: LinkBuilder,
        delivery: DeliveryConfig,
    ) -> Self {
        let retry = delivery.retry_policy();
        Self {
            transport,
            enricher,
            links,
            delivery,
            retry,
        }
    }

    /// Send every event of one day in store order; an empty day sends a
    /// liveness notice instead of silence.
    pub async fn send_daily_digest(
        &self,
        chat_id: &str,
        events: &[Event],
        on_date: NaiveDate,
    ) -> DigestSummary {
        if events.is_empty() {
            info!(date = %on_date, "No events today, sending notice");
            if let Err(err) = self.send_text_with_retry(chat_id, NO_EVENTS_NOTICE).await {
                error!(error = %err, "Failed to deliver empty-day notice");
            }
            return DigestSummary::default();
        }

        let mut summary = DigestSummary::default();
        for event in events {
            match self.send_event(chat_id, event, on_date).await {
                DispatchOutcome::Sent => summary.sent += 1,
                DispatchOutcome::Failed => summary.failed += 1,
                DispatchOutcome::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    /// Enrich and deliver one event; terminal on the first successful send
    /// or once retries are exhausted.
    #[instrument(skip(self, event), fields(event = %event.title))]
    pub async fn send_event(
        &self,
        chat_id: &str,
        event: &Event,
        on_date: NaiveDate,
    ) -> DispatchOutcome {
        let enrichment = match self.enricher.enrich(event).await {
            Ok(enrichment) => enrichment,
            Err(err) => {
                warn!(error = %err, "Skipping event");
                record_event_outcome(DispatchOutcome::Skipped.as_str());
                return DispatchOutcome::Skipped;
            }
        };

        let media = self.collect_media(&enrichment.books);
        let outcome = if media.is_empty() {
            self.send_text_flow(chat_id, event, &enrichment, on_date)
                .await
        } else {
            match self
                .send_media_flow(chat_id, event, &enrichment, &media, on_date)
                .await
            {
                Ok(()) => {
                    record_delivery("media", true);
                    tokio::time::sleep(self.delivery.media_pacing()).await;
                    DispatchOutcome::Sent
                }
                Err(err) => {
                    record_delivery("media", false);
                    warn!(error = %err, "Media delivery failed, falling back to text");
                    self.send_text_flow(chat_id, event, &enrichment, on_date)
                        .await
                }
            }
        };

        record_event_outcome(outcome.as_str());
        outcome
    }

    /// Books with a resolvable cover URL become the media batch
    fn collect_media(&self, books: &[BookCandidate]) -> Vec<MediaItem> {
        books
            .iter()
            .filter_map(|book| {
                book.metadata
                    .cover_image_url(self.links.base())
                    .map(|url| MediaItem {
                        url,
                        caption: Some(book.name.clone()),
                    })
            })
            .take(MAX_MEDIA_ITEMS)
            .collect()
    }

    /// Covers go out as actual media; the formatted message (without inline
    /// cover URLs) becomes the caption, truncated to the transport ceiling.
    async fn send_media_flow(
        &self,
        chat_id: &str,
        event: &Event,
        enrichment: &Enrichment,
        media: &[MediaItem],
        on_date: NaiveDate,
    ) -> Result<(), SendError> {
        let message = format_event_message(
            event,
            &enrichment.books,
            &enrichment.links,
            &self.links,
            &FormatOptions {
                on_date,
                include_image_urls: false,
            },
        );
        let caption = truncate_caption(&message, self.delivery.caption_limit);

        if media.len() == 1 {
            return self
                .transport
                .send_photo(chat_id, &media[0].url, &caption)
                .await;
        }

        // Only the first item of a group carries the caption
        let items: Vec<MediaItem> = media
            .iter()
            .enumerate()
            .map(|(idx, item)| MediaItem {
                url: item.url.clone(),
                caption: (idx == 0).then(|| caption.clone()),
            })
            .collect();

        self.transport.send_media_group(chat_id, &items).await
    }

    /// Plain-text delivery with inline cover URLs, retried on transient
    /// failures
    async fn send_text_flow(
        &self,
        chat_id: &str,
        event: &Event,
        enrichment: &Enrichment,
        on_date: NaiveDate,
    ) -> DispatchOutcome {
        let message = format_event_message(
            event,
            &enrichment.books,
            &enrichment.links,
            &self.links,
            &FormatOptions {
                on_date,
                include_image_urls: true,
            },
        );

        match self.send_text_with_retry(chat_id, &message).await {
            Ok(()) => {
                record_delivery("text", true);
                tokio::time::sleep(self.delivery.text_pacing()).await;
                DispatchOutcome::Sent
            }
            Err(err) => {
                record_delivery("text", false);
                error!(error = %err, "Failed to deliver event");
                DispatchOutcome::Failed
            }
        }
    }

    async fn send_text_with_retry(&self, chat_id: &str, text: &str) -> Result<(), SendError> {
        self.retry
            .run(
                "send_text",
                move || self.transport.send_text(chat_id, text),
                SendError::is_transient,
            )
            .await
    }
}

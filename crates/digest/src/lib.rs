//! Almanac Digest Pipeline
//!
//! The enrichment-and-delivery core:
//! - Enrichment engine: books and contextual links for one event
//! - Message formatter: markup text with locale-aware date rendering
//! - Digest dispatcher: media/text delivery with truncation and retries
//! - Jubilee reporter: month-grouped year report

pub mod dispatch;
pub mod enrich;
pub mod format;
pub mod jubilee;
pub mod links;

pub use dispatch::{DigestSummary, DispatchOutcome, Dispatcher};
pub use enrich::{EnrichError, Enricher, Enrichment};
pub use format::{age_noun_form, is_jubilee, AgeNounForm, FormatOptions};
pub use jubilee::JubileeReporter;
pub use links::LinkBuilder;

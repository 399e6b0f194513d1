//! Data model for the digest pipeline
//!
//! All types here are transient, value-like records constructed per digest
//! run; nothing is persisted except the event store rows themselves.

pub mod book;
pub mod event;
pub mod jubilee;

pub use book::{
    BookCandidate, BookMetadata, BookRecord, BookSource, ContextualLink, ImageRef, LinkType,
};
pub use event::{Event, EventType, Reference, ReferenceType};
pub use jubilee::JubileeRecord;

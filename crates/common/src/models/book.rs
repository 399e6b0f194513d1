//! Book projections gathered during enrichment
//!
//! The remote catalog and the local store disagree on the shape of the
//! cover-image descriptor (bare URL string vs. nested object), so the image
//! is modeled as a tagged variant with a single normalization path.

use serde::{Deserialize, Serialize};

/// Cover-image descriptor as stored in reference metadata or returned by the
/// catalog API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageRef {
    Url(String),
    Structured {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        original: Option<String>,
        #[serde(default)]
        preview: Option<String>,
    },
}

impl ImageRef {
    /// Best-effort URL out of the variant, empty strings excluded
    pub fn best_url(&self) -> Option<&str> {
        match self {
            ImageRef::Url(url) => non_empty(Some(url)),
            ImageRef::Structured {
                url,
                original,
                preview,
            } => non_empty(url.as_deref())
                .or_else(|| non_empty(original.as_deref()))
                .or_else(|| non_empty(preview.as_deref())),
        }
    }
}

/// Normalize a possibly-relative image URL against the catalog site base
pub fn normalize_image_url(url: &str, base: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("{}/{}", base.trim_end_matches('/'), url.trim_start_matches('/'))
    }
}

/// Free-form metadata attached to a book reference or candidate
///
/// The flat `cover_url`/`image_url`/`cover` keys are legacy store shapes that
/// predate the nested descriptor; normalization checks them last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
}

impl BookMetadata {
    /// Parse a raw metadata blob from the store
    ///
    /// The column historically held either a JSON object or a bare URL
    /// string; anything unrecognized collapses to empty metadata.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(serde_json::Value::Object(_)) => {
                serde_json::from_str::<BookMetadata>(trimmed).unwrap_or_default()
            }
            Ok(serde_json::Value::String(url)) if url.starts_with("http") => Self {
                cover_url: Some(url),
                ..Self::default()
            },
            Ok(_) => Self::default(),
            Err(_) if trimmed.starts_with("http") => Self {
                cover_url: Some(trimmed.to_string()),
                ..Self::default()
            },
            Err(_) => Self::default(),
        }
    }

    /// Resolved cover URL, normalized against the site base
    pub fn cover_image_url(&self, base: &str) -> Option<String> {
        if let Some(url) = self.image.as_ref().and_then(ImageRef::best_url) {
            return Some(normalize_image_url(url, base));
        }
        for flat in [&self.cover_url, &self.image_url, &self.cover] {
            if let Some(url) = non_empty(flat.as_deref()) {
                return Some(normalize_image_url(url, base));
            }
        }
        None
    }

    /// Whether any cover descriptor is present at all
    pub fn has_cover(&self) -> bool {
        self.cover_image_url("").is_some()
    }
}

/// Raw book projection as returned by the catalog API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub annotation: Option<String>,
    #[serde(default)]
    pub image: Option<ImageRef>,
}

impl BookRecord {
    /// Convert into an enrichment candidate, stamping provenance
    pub fn into_candidate(self, source: BookSource) -> BookCandidate {
        BookCandidate {
            uuid: Some(self.uuid),
            name: if self.name.is_empty() {
                "Без названия".to_string()
            } else {
                self.name
            },
            slug: self.slug.filter(|s| !s.is_empty()),
            metadata: BookMetadata {
                image: self.image,
                annotation: self.annotation.filter(|a| !a.is_empty()),
                ..BookMetadata::default()
            },
            source,
        }
    }
}

/// A book gathered during enrichment, not yet rendered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookCandidate {
    pub uuid: Option<String>,
    pub name: String,
    pub slug: Option<String>,
    pub metadata: BookMetadata,
    pub source: BookSource,
}

/// Provenance of a book candidate; diagnostics only, never affects ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookSource {
    Database,
    ApiSearch,
    AuthorApi,
    TagApi,
    CategoryApi,
}

impl BookSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookSource::Database => "database",
            BookSource::ApiSearch => "api_search",
            BookSource::AuthorApi => "author_api",
            BookSource::TagApi => "tag_api",
            BookSource::CategoryApi => "category_api",
        }
    }
}

/// A contextual link rendered alongside the books block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextualLink {
    pub link_type: LinkType,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Author,
    Tag,
    Category,
    Search,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://example.com";

    #[test]
    fn test_image_ref_bare_string() {
        let parsed: ImageRef = serde_json::from_str("\"covers/war.jpg\"").unwrap();
        assert_eq!(parsed.best_url(), Some("covers/war.jpg"));
    }

    #[test]
    fn test_image_ref_structured_priority() {
        let parsed: ImageRef =
            serde_json::from_str(r#"{"original": "o.jpg", "preview": "p.jpg"}"#).unwrap();
        assert_eq!(parsed.best_url(), Some("o.jpg"));

        let empty_url: ImageRef =
            serde_json::from_str(r#"{"url": "", "preview": "p.jpg"}"#).unwrap();
        assert_eq!(empty_url.best_url(), Some("p.jpg"));
    }

    #[test]
    fn test_normalize_relative_url() {
        assert_eq!(
            normalize_image_url("/covers/war.jpg", BASE),
            "https://example.com/covers/war.jpg"
        );
        assert_eq!(
            normalize_image_url("https://cdn.example.com/a.jpg", BASE),
            "https://cdn.example.com/a.jpg"
        );
    }

    #[test]
    fn test_metadata_parse_json_object() {
        let metadata = BookMetadata::parse(r#"{"image": {"url": "a.jpg"}, "annotation": "About"}"#);
        assert_eq!(
            metadata.cover_image_url(BASE),
            Some("https://example.com/a.jpg".to_string())
        );
        assert_eq!(metadata.annotation.as_deref(), Some("About"));
    }

    #[test]
    fn test_metadata_parse_bare_url() {
        let metadata = BookMetadata::parse("https://cdn.example.com/a.jpg");
        assert_eq!(
            metadata.cover_image_url(BASE),
            Some("https://cdn.example.com/a.jpg".to_string())
        );
    }

    #[test]
    fn test_metadata_parse_json_encoded_url() {
        let metadata = BookMetadata::parse("\"https://cdn.example.com/a.jpg\"");
        assert_eq!(
            metadata.cover_image_url(BASE),
            Some("https://cdn.example.com/a.jpg".to_string())
        );
    }

    #[test]
    fn test_metadata_parse_garbage() {
        let metadata = BookMetadata::parse("not json, not a url");
        assert!(!metadata.has_cover());
    }

    #[test]
    fn test_metadata_flat_key_fallback() {
        let metadata = BookMetadata {
            cover_url: Some("flat.jpg".into()),
            ..BookMetadata::default()
        };
        assert_eq!(
            metadata.cover_image_url(BASE),
            Some("https://example.com/flat.jpg".to_string())
        );
    }

    #[test]
    fn test_record_into_candidate() {
        let record = BookRecord {
            uuid: "b-1".into(),
            name: String::new(),
            slug: Some("war-and-peace".into()),
            annotation: Some("Роман-эпопея".into()),
            image: Some(ImageRef::Url("a.jpg".into())),
        };
        let candidate = record.into_candidate(BookSource::AuthorApi);
        assert_eq!(candidate.name, "Без названия");
        assert_eq!(candidate.uuid.as_deref(), Some("b-1"));
        assert_eq!(candidate.source, BookSource::AuthorApi);
        assert!(candidate.metadata.has_cover());
    }
}

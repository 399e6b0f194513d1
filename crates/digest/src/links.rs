//! Deterministic catalog URL construction
//!
//! Link formats are part of the public site contract and must be
//! reproduced bit-exact.

/// Builds catalog page and filter URLs from a configured site base
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    base: String,
}

impl LinkBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Book page: `{base}/catalog/{slug}`
    pub fn book(&self, slug: &str) -> String {
        format!("{}/catalog/{}", self.base, slug)
    }

    /// Author page: `{base}/authors/{slugOrUuid}`
    pub fn author(&self, slug_or_uuid: &str) -> String {
        format!("{}/authors/{}", self.base, slug_or_uuid)
    }

    /// Tag filter: `{base}/catalog?tags={id}`
    pub fn tag(&self, id: &str) -> String {
        format!("{}/catalog?tags={}", self.base, id)
    }

    /// Category filter: `{base}/catalog?categories={id}`
    pub fn category(&self, id: &str) -> String {
        format!("{}/catalog?categories={}", self.base, id)
    }

    /// Generic search: `{base}/catalog?search={urlEncodedTitle}`
    pub fn search(&self, title: &str) -> String {
        format!("{}/catalog?search={}", self.base, urlencoding::encode(title))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links() -> LinkBuilder {
        LinkBuilder::new("https://example.com/")
    }

    #[test]
    fn test_url_formats_are_exact() {
        let links = links();
        assert_eq!(links.book("war-and-peace"), "https://example.com/catalog/war-and-peace");
        assert_eq!(links.author("chekhov"), "https://example.com/authors/chekhov");
        assert_eq!(links.tag("t-1"), "https://example.com/catalog?tags=t-1");
        assert_eq!(
            links.category("c-1"),
            "https://example.com/catalog?categories=c-1"
        );
    }

    #[test]
    fn test_search_url_is_encoded() {
        assert_eq!(
            links().search("Война и мир"),
            "https://example.com/catalog?search=%D0%92%D0%BE%D0%B9%D0%BD%D0%B0%20%D0%B8%20%D0%BC%D0%B8%D1%80"
        );
    }
}

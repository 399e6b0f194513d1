//! Message formatting
//!
//! Pure, synchronous mapping from an enriched event to an HTML-markup
//! string. The markup vocabulary is fixed (bold, italic, underline,
//! anchor); the transport rejects anything else.

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex_lite::Regex;

use almanac_common::models::{BookCandidate, ContextualLink, Event, EventType};

use crate::links::LinkBuilder;

/// Genitive month names for the date line
const MONTHS_GENITIVE: [&str; 12] = [
    "января",
    "февраля",
    "марта",
    "апреля",
    "мая",
    "июня",
    "июля",
    "августа",
    "сентября",
    "октября",
    "ноября",
    "декабря",
];

/// Annotation excerpt length, in characters
const ANNOTATION_EXCERPT_CHARS: usize = 100;

/// Earliest birth year accepted from either resolution source
const MIN_BIRTH_YEAR: i32 = 1400;

/// Russian plural category for the age unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeNounForm {
    /// "год" — final digit 1, except the teens
    Singular,
    /// "года" — final digit 2..4, except the teens
    Few,
    /// "лет" — everything else, including 11..14
    Many,
}

impl AgeNounForm {
    pub fn word(self) -> &'static str {
        match self {
            AgeNounForm::Singular => "год",
            AgeNounForm::Few => "года",
            AgeNounForm::Many => "лет",
        }
    }
}

/// Noun agreement for an age; the teens always take the genitive plural
pub fn age_noun_form(age: i32) -> AgeNounForm {
    let last_two = age % 100;
    if (11..=14).contains(&last_two) {
        return AgeNounForm::Many;
    }
    match age % 10 {
        1 => AgeNounForm::Singular,
        2..=4 => AgeNounForm::Few,
        _ => AgeNounForm::Many,
    }
}

/// An age is a jubilee when it ends in 0 or 5; zero and negative ages are
/// never rendered at all
pub fn is_jubilee(age: i32) -> bool {
    age > 0 && (age % 10 == 0 || age % 10 == 5)
}

fn year_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(1[4-9][0-9]{2}|2[0-2][0-9]{2})\b").expect("year regex is valid")
    })
}

/// Resolve a birth year: a 4-digit token in the title wins over the stored
/// `year` field, which is accepted only inside [1400, current year]
pub fn resolve_birth_year(title: &str, stored_year: Option<i32>, current_year: i32) -> Option<i32> {
    if let Some(caps) = year_token_regex().captures(title) {
        if let Some(year) = caps.get(1).and_then(|m| m.as_str().parse::<i32>().ok()) {
            return Some(year);
        }
    }
    stored_year.filter(|y| (MIN_BIRTH_YEAR..=current_year).contains(y))
}

/// Rendering options for one message build
#[derive(Debug, Clone)]
pub struct FormatOptions {
    /// Concrete digest date used for the date line and age computation
    pub on_date: NaiveDate,
    /// Inline raw cover URLs as text; false when covers go out as media
    pub include_image_urls: bool,
}

/// Render one enriched event as an HTML message
pub fn format_event_message(
    event: &Event,
    books: &[BookCandidate],
    links: &[ContextualLink],
    link_builder: &LinkBuilder,
    opts: &FormatOptions,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(format!("📚 <b>{}</b>", event.title));

    let date = opts.on_date;
    parts.push(format!(
        "📅 {} {} {}",
        date.day(),
        MONTHS_GENITIVE[date.month0() as usize],
        date.year()
    ));

    if event.event_type == EventType::Birthday {
        if let Some(birth_year) = resolve_birth_year(&event.title, event.year, date.year()) {
            let age = date.year() - birth_year;
            if age > 0 {
                let word = age_noun_form(age).word();
                if is_jubilee(age) {
                    parts.push(format!(
                        "🎂 <u><b>🎉 {} {} со дня рождения 🎉</b></u>",
                        age, word
                    ));
                } else {
                    parts.push(format!("🎂 {} {} со дня рождения", age, word));
                }
            }
        }
    }

    if let Some(description) = event.description.as_deref().filter(|d| !d.is_empty()) {
        parts.push(format!("\n{}", description));
    }

    if !links.is_empty() {
        parts.push("\n🔗 <b>Ссылки:</b>".to_string());
        for link in links {
            if link.url.is_empty() {
                parts.push(format!("\n• {}", link.name));
            } else {
                parts.push(format!("\n• <a href='{}'>{}</a>", link.url, link.name));
            }
        }
    }

    if books.is_empty() {
        parts.push("\n<i>Читайте и слушайте книги в каталоге!</i>".to_string());
    } else {
        parts.push("\n📖 <b>Книги:</b>".to_string());
        for book in books.iter().take(6) {
            match book.slug.as_deref().filter(|s| !s.is_empty()) {
                Some(slug) => parts.push(format!(
                    "• <a href='{}'>{}</a>",
                    link_builder.book(slug),
                    book.name
                )),
                None => parts.push(format!("• {}", book.name)),
            }

            if opts.include_image_urls {
                if let Some(url) = book.metadata.cover_image_url(link_builder.base()) {
                    parts.push(format!("  <i>Обложка: {}</i>", url));
                }
            }

            if let Some(annotation) = book.metadata.annotation.as_deref().filter(|a| !a.is_empty()) {
                let excerpt: String = annotation.chars().take(ANNOTATION_EXCERPT_CHARS).collect();
                parts.push(format!("  <i>{}</i>", excerpt));
            }
        }
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use almanac_common::models::{BookMetadata, BookSource, ImageRef, LinkType};

    fn event(title: &str, event_type: EventType, year: Option<i32>) -> Event {
        Event {
            id: 1,
            title: title.to_string(),
            description: None,
            month: 1,
            day: 29,
            event_type,
            year,
            references: Vec::new(),
        }
    }

    fn opts(date: NaiveDate) -> FormatOptions {
        FormatOptions {
            on_date: date,
            include_image_urls: true,
        }
    }

    fn link_builder() -> LinkBuilder {
        LinkBuilder::new("https://example.com")
    }

    fn book(name: &str, slug: Option<&str>) -> BookCandidate {
        BookCandidate {
            uuid: Some(format!("uuid-{}", name)),
            name: name.to_string(),
            slug: slug.map(String::from),
            metadata: BookMetadata::default(),
            source: BookSource::Database,
        }
    }

    #[test]
    fn test_age_noun_form_boundaries() {
        let cases = [
            (1, AgeNounForm::Singular),
            (2, AgeNounForm::Few),
            (5, AgeNounForm::Many),
            (11, AgeNounForm::Many),
            (12, AgeNounForm::Many),
            (14, AgeNounForm::Many),
            (15, AgeNounForm::Many),
            (21, AgeNounForm::Singular),
            (25, AgeNounForm::Many),
            (100, AgeNounForm::Many),
            (101, AgeNounForm::Singular),
            (111, AgeNounForm::Many),
            (115, AgeNounForm::Many),
        ];
        for (age, expected) in cases {
            assert_eq!(age_noun_form(age), expected, "age {}", age);
        }
        assert_eq!(age_noun_form(3).word(), "года");
        assert_eq!(age_noun_form(164).word(), "года");
    }

    #[test]
    fn test_is_jubilee() {
        for age in [5, 10, 95, 150, 165] {
            assert!(is_jubilee(age), "age {}", age);
        }
        for age in [1, 3, 164, 111] {
            assert!(!is_jubilee(age), "age {}", age);
        }
        assert!(!is_jubilee(0));
        assert!(!is_jubilee(-5));
    }

    #[test]
    fn test_birth_year_from_title_wins() {
        assert_eq!(
            resolve_birth_year("Антон Чехов родился в 1860 году", Some(1900), 2024),
            Some(1860)
        );
    }

    #[test]
    fn test_birth_year_from_stored_field() {
        assert_eq!(resolve_birth_year("Антон Чехов", Some(1860), 2024), Some(1860));
        // Outside the accepted range
        assert_eq!(resolve_birth_year("Основание города", Some(1215), 2024), None);
        assert_eq!(resolve_birth_year("Событие", Some(2100), 2024), None);
        assert_eq!(resolve_birth_year("Событие", None, 2024), None);
    }

    #[test]
    fn test_birth_year_token_range() {
        // 1399 is below the accepted window; the regex must not match it
        assert_eq!(resolve_birth_year("Хроника 1399 года", None, 2024), None);
        assert_eq!(
            resolve_birth_year("Хроника 1400 года", None, 2024),
            Some(1400)
        );
    }

    #[test]
    fn test_plain_birthday_annotation() {
        // 2024 - 1860 = 164, ends in 4: "года", no amplification
        let message = format_event_message(
            &event(
                "Антон Чехов родился в 1860 году",
                EventType::Birthday,
                None,
            ),
            &[],
            &[],
            &link_builder(),
            &opts(NaiveDate::from_ymd_opt(2024, 1, 29).unwrap()),
        );
        assert!(message.contains("🎂 164 года со дня рождения"));
        assert!(!message.contains("<u>"));
        assert!(message.contains("📅 29 января 2024"));
    }

    #[test]
    fn test_jubilee_annotation_is_amplified() {
        // 2025 - 1860 = 165, ends in 5: jubilee
        let message = format_event_message(
            &event(
                "Антон Чехов родился в 1860 году",
                EventType::Birthday,
                None,
            ),
            &[],
            &[],
            &link_builder(),
            &opts(NaiveDate::from_ymd_opt(2025, 1, 29).unwrap()),
        );
        assert!(message.contains("<u><b>🎉 165 лет со дня рождения 🎉</b></u>"));
    }

    #[test]
    fn test_no_annotation_for_non_birthday() {
        let message = format_event_message(
            &event("Памятная дата 1860 года", EventType::MemorableDay, None),
            &[],
            &[],
            &link_builder(),
            &opts(NaiveDate::from_ymd_opt(2024, 1, 29).unwrap()),
        );
        assert!(!message.contains("🎂"));
    }

    #[test]
    fn test_no_books_notice() {
        let message = format_event_message(
            &event("Событие", EventType::Custom, None),
            &[],
            &[],
            &link_builder(),
            &opts(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
        );
        assert!(message.contains("Читайте и слушайте книги"));
        assert!(!message.contains("📖"));
    }

    #[test]
    fn test_books_and_links_blocks() {
        let links = vec![ContextualLink {
            link_type: LinkType::Author,
            name: "Антон Чехов".into(),
            url: "https://example.com/authors/chekhov".into(),
        }];
        let books = vec![book("Палата № 6", Some("palata-6")), book("Чайка", None)];

        let message = format_event_message(
            &event("Событие", EventType::Custom, None),
            &books,
            &links,
            &link_builder(),
            &opts(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
        );

        assert!(message.contains("🔗 <b>Ссылки:</b>"));
        assert!(message
            .contains("• <a href='https://example.com/authors/chekhov'>Антон Чехов</a>"));
        assert!(message.contains("• <a href='https://example.com/catalog/palata-6'>Палата № 6</a>"));
        assert!(message.contains("• Чайка"));
    }

    #[test]
    fn test_cover_line_follows_option() {
        let mut with_cover = book("Чайка", Some("chaika"));
        with_cover.metadata.image = Some(ImageRef::Url("covers/chaika.jpg".into()));

        let base_event = event("Событие", EventType::Custom, None);
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let inline = format_event_message(
            &base_event,
            std::slice::from_ref(&with_cover),
            &[],
            &link_builder(),
            &FormatOptions {
                on_date: date,
                include_image_urls: true,
            },
        );
        assert!(inline.contains("Обложка: https://example.com/covers/chaika.jpg"));

        let media = format_event_message(
            &base_event,
            std::slice::from_ref(&with_cover),
            &[],
            &link_builder(),
            &FormatOptions {
                on_date: date,
                include_image_urls: false,
            },
        );
        assert!(!media.contains("Обложка:"));
    }

    #[test]
    fn test_annotation_excerpt_is_char_bounded() {
        let mut noted = book("Чайка", None);
        noted.metadata.annotation = Some("х".repeat(250));

        let message = format_event_message(
            &event("Событие", EventType::Custom, None),
            &[noted],
            &[],
            &link_builder(),
            &opts(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
        );
        let excerpt_line = message
            .lines()
            .find(|l| l.trim_start().starts_with("<i>х"))
            .unwrap();
        assert_eq!(excerpt_line.matches('х').count(), 100);
    }
}

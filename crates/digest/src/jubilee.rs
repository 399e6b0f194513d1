//! Jubilee year report
//!
//! Groups anniversary records by month, sorts each bucket by day and then
//! by descending age (larger jubilees surface first on tied days), and
//! renders one combined message.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, instrument};

use almanac_common::models::{JubileeRecord, Reference, ReferenceType};
use almanac_common::retry::RetryPolicy;
use almanac_common::transport::{SendError, Transport};

use crate::format::age_noun_form;
use crate::links::LinkBuilder;

/// Nominative month names for the report headers
const MONTHS_NOMINATIVE: [&str; 12] = [
    "Январь",
    "Февраль",
    "Март",
    "Апрель",
    "Май",
    "Июнь",
    "Июль",
    "Август",
    "Сентябрь",
    "Октябрь",
    "Ноябрь",
    "Декабрь",
];

/// Bucket key for records whose MM-DD key did not parse
const UNKNOWN_MONTH: u32 = 0;

/// Render the combined report for one year
pub fn render_jubilee_report(year: i32, records: &[JubileeRecord], links: &LinkBuilder) -> String {
    let mut by_month: BTreeMap<u32, Vec<&JubileeRecord>> = BTreeMap::new();
    for record in records {
        let month = record
            .month
            .filter(|m| (1..=12).contains(m))
            .unwrap_or(UNKNOWN_MONTH);
        by_month.entry(month).or_default().push(record);
    }

    let mut parts = vec![format!("🎉 <b>Юбиляры — {} год</b>\n", year)];

    for month in 1..=12u32 {
        let Some(bucket) = by_month.get_mut(&month) else {
            continue;
        };
        sort_bucket(bucket);
        parts.push(format!("\n📅 <b>{}</b>", MONTHS_NOMINATIVE[(month - 1) as usize]));
        for record in bucket.iter() {
            parts.push(render_record(record, links));
        }
    }

    if let Some(bucket) = by_month.get_mut(&UNKNOWN_MONTH) {
        sort_bucket(bucket);
        parts.push("\n📅 <b>Без указания месяца</b>".to_string());
        for record in bucket.iter() {
            parts.push(render_record(record, links));
        }
    }

    parts.join("\n")
}

fn sort_bucket(bucket: &mut [&JubileeRecord]) {
    bucket.sort_by_key(|r| (r.day.unwrap_or(999), std::cmp::Reverse(r.age)));
}

fn render_record(record: &JubileeRecord, links: &LinkBuilder) -> String {
    let attributions: Vec<String> = record
        .references
        .iter()
        .filter_map(|reference| render_attribution(reference, links))
        .collect();

    let refs_text = if attributions.is_empty() {
        String::new()
    } else {
        format!(" — {}", attributions.join(", "))
    };

    format!(
        "• <b>{} {}</b> — {}{}",
        record.age,
        age_noun_form(record.age).word(),
        record.title,
        refs_text
    )
}

/// Author and book references become anchors; everything else renders as a
/// plain name
fn render_attribution(reference: &Reference, links: &LinkBuilder) -> Option<String> {
    match reference.reference_type {
        ReferenceType::Author if reference.uuid.is_some() => {
            let ident = reference.link_identifier()?;
            Some(format!(
                "<a href='{}'>{}</a>",
                links.author(ident),
                reference.name
            ))
        }
        ReferenceType::Book if reference.slug.as_deref().is_some_and(|s| !s.is_empty()) => {
            let slug = reference.slug.as_deref()?;
            Some(format!(
                "<a href='{}'>{}</a>",
                links.book(slug),
                reference.name
            ))
        }
        _ => {
            if reference.name.is_empty() {
                None
            } else {
                Some(reference.name.clone())
            }
        }
    }
}

/// Sends the year report through the messaging transport
pub struct JubileeReporter {
    transport: Arc<dyn Transport>,
    links: LinkBuilder,
    retry: RetryPolicy,
}

impl JubileeReporter {
    pub fn new(transport: Arc<dyn Transport>, links: LinkBuilder, retry: RetryPolicy) -> Self {
        Self {
            transport,
            links,
            retry,
        }
    }

    /// Deliver the report; an empty record list sends a short notice
    /// instead of an empty report.
    #[instrument(skip(self, records))]
    pub async fn send_year_report(
        &self,
        chat_id: &str,
        year: i32,
        records: &[JubileeRecord],
    ) -> Result<(), SendError> {
        let message = if records.is_empty() {
            format!("🎉 Юбиляров в {} году не найдено.", year)
        } else {
            render_jubilee_report(year, records, &self.links)
        };

        info!(year, count = records.len(), "Sending jubilee report");
        let text = message.as_str();
        self.retry
            .run(
                "send_jubilees",
                move || self.transport.send_text(chat_id, text),
                SendError::is_transient,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use almanac_common::models::BookMetadata;
    use almanac_common::transport::{MockTransport, TransportCall};
    use std::time::Duration;

    fn links() -> LinkBuilder {
        LinkBuilder::new("https://example.com")
    }

    fn record(title: &str, month: Option<u32>, day: Option<u32>, age: i32) -> JubileeRecord {
        JubileeRecord {
            title: title.into(),
            month,
            day,
            age,
            references: Vec::new(),
        }
    }

    #[test]
    fn test_report_groups_and_sorts() {
        let records = vec![
            record("Поздний январский", Some(1), Some(30), 100),
            record("Ранний январский", Some(1), Some(10), 150),
            record("Тот же день, меньше", Some(1), Some(10), 50),
            record("Мартовский", Some(3), Some(5), 75),
            record("Без месяца", None, None, 95),
        ];

        let report = render_jubilee_report(2025, &records, &links());

        assert!(report.starts_with("🎉 <b>Юбиляры — 2025 год</b>"));
        // Month headers in calendar order, unknown bucket last
        let january = report.find("<b>Январь</b>").unwrap();
        let march = report.find("<b>Март</b>").unwrap();
        let unknown = report.find("Без указания месяца").unwrap();
        assert!(january < march && march < unknown);

        // Within January: day ascending, larger age first on the tied day
        let early = report.find("Ранний январский").unwrap();
        let tied = report.find("Тот же день, меньше").unwrap();
        let late = report.find("Поздний январский").unwrap();
        assert!(early < tied && tied < late);
    }

    #[test]
    fn test_record_rendering_with_attributions() {
        let references = vec![
            Reference {
                reference_type: ReferenceType::Author,
                uuid: Some("a-1".into()),
                slug: Some("chekhov".into()),
                name: "Антон Чехов".into(),
                priority: 0,
                metadata: BookMetadata::default(),
            },
            Reference {
                reference_type: ReferenceType::Book,
                uuid: Some("b-1".into()),
                slug: Some("chaika".into()),
                name: "Чайка".into(),
                priority: 1,
                metadata: BookMetadata::default(),
            },
            Reference {
                reference_type: ReferenceType::Tag,
                uuid: Some("t-1".into()),
                slug: None,
                name: "Пьесы".into(),
                priority: 2,
                metadata: BookMetadata::default(),
            },
        ];
        let mut record = record("Антон Чехов", Some(1), Some(29), 165);
        record.references = references;

        let report = render_jubilee_report(2025, &[record], &links());
        assert!(report.contains(
            "• <b>165 лет</b> — Антон Чехов — \
             <a href='https://example.com/authors/chekhov'>Антон Чехов</a>, \
             <a href='https://example.com/catalog/chaika'>Чайка</a>, Пьесы"
        ));
    }

    #[tokio::test]
    async fn test_empty_year_sends_notice() {
        let transport = Arc::new(MockTransport::new());
        let reporter = JubileeReporter::new(
            transport.clone(),
            links(),
            RetryPolicy::new(3, Duration::ZERO),
        );

        reporter.send_year_report("chat", 2025, &[]).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        let TransportCall::Text { text, .. } = &calls[0] else {
            panic!("expected text");
        };
        assert_eq!(text, "🎉 Юбиляров в 2025 году не найдено.");
    }

    #[tokio::test]
    async fn test_report_delivery_retries_transient_failures() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_next(SendError::Transient("flood".into()));
        let reporter = JubileeReporter::new(
            transport.clone(),
            links(),
            RetryPolicy::new(3, Duration::ZERO),
        );

        let records = vec![record("Антон Чехов", Some(1), Some(29), 165)];
        reporter
            .send_year_report("chat", 2025, &records)
            .await
            .unwrap();
        assert_eq!(transport.calls().len(), 2);
    }
}

// src/normalize.rs
//! Pure mapping from per-source silver rows to the unified gold record.
//! Total: malformed optional fields degrade to `None`, nothing here fails.

use crate::model::{CanonicalRecord, CnWindRecord, JpMinkabuRecord, SourceKind, SourceRecord};

pub fn normalize(record: &SourceRecord) -> CanonicalRecord {
    match record {
        SourceRecord::JpMinkabu(r) => normalize_jp_minkabu(r),
        SourceRecord::CnWind(r) => normalize_cn_wind(r),
    }
}

pub fn normalize_batch(records: &[SourceRecord]) -> Vec<CanonicalRecord> {
    records.iter().map(normalize).collect()
}

/// Minkabu models attribution as a list; the unified shape keeps the first entry.
/// Minkabu has no keyword concept, so keywords stay absent (not empty).
pub fn normalize_jp_minkabu(r: &JpMinkabuRecord) -> CanonicalRecord {
    let provider = r
        .providers
        .first()
        .and_then(|p| clean_opt(Some(p.as_str())));

    CanonicalRecord {
        source: SourceKind::JpMinkabu,
        source_news_id: r.news_id.clone(),
        original_headline: r.original_headline.clone(),
        original_content: clean_opt(r.original_story.as_deref()),
        translated_headline: r.translated_headline.clone(),
        translated_content: clean_opt(r.translated_story.as_deref()),
        tickers: r.tickers.clone(),
        topics: r.topics.clone(),
        keywords: None,
        provider,
        published_at: r.creation_time,
        model_name: r.model_name.clone(),
        source_created_at: Some(r.created_at),
        source_updated_at: Some(r.updated_at),
        synced_at: None,
    }
}

pub fn normalize_cn_wind(r: &CnWindRecord) -> CanonicalRecord {
    CanonicalRecord {
        source: SourceKind::CnWind,
        source_news_id: r.object_id.clone(),
        original_headline: r.original_title.clone(),
        original_content: clean_opt(r.original_content.as_deref()),
        translated_headline: r.translated_title.clone(),
        translated_content: clean_opt(r.translated_content.as_deref()),
        tickers: r.wind_codes.clone(),
        topics: r.sections.clone(),
        keywords: r.keywords.clone(),
        provider: clean_opt(r.source.as_deref()),
        published_at: r.publish_date,
        model_name: r.model_name.clone(),
        source_created_at: Some(r.created_at),
        source_updated_at: Some(r.updated_at),
        synced_at: None,
    }
}

/// Blank optional text counts as absent.
///
/// Stricter than passing silver values through: a whitespace-only story,
/// content or provider is stored as NULL, so consumers never see an empty body
/// or an empty attribution label.
fn clean_opt(s: Option<&str>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn jp(providers: Vec<&str>) -> JpMinkabuRecord {
        let t = Utc.with_ymd_and_hms(2025, 5, 2, 8, 30, 0).unwrap();
        JpMinkabuRecord {
            id: 7,
            news_id: "MK-1".into(),
            original_headline: "日経平均、続伸".into(),
            original_story: Some("   ".into()),
            translated_headline: "Nikkei extends gains".into(),
            translated_story: Some("Stocks rose.".into()),
            providers: providers.into_iter().map(String::from).collect(),
            topics: vec!["market".into()],
            tickers: vec!["7203".into()],
            creation_time: t,
            model_name: "mt-v2".into(),
            created_at: t,
            updated_at: t + chrono::Duration::minutes(5),
        }
    }

    #[test]
    fn minkabu_takes_first_provider_and_has_no_keywords() {
        let c = normalize_jp_minkabu(&jp(vec!["Kabutan", "Reuters"]));
        assert_eq!(c.source, SourceKind::JpMinkabu);
        assert_eq!(c.source_news_id, "MK-1");
        assert_eq!(c.provider.as_deref(), Some("Kabutan"));
        assert_eq!(c.keywords, None);
        assert_eq!(c.original_content, None, "blank story degrades to absent");
        assert_eq!(c.translated_content.as_deref(), Some("Stocks rose."));
        assert_eq!(c.published_at, jp(vec![]).creation_time);
        assert_eq!(c.source_updated_at, Some(jp(vec![]).updated_at));
    }

    #[test]
    fn minkabu_without_providers_has_no_provider() {
        assert_eq!(normalize_jp_minkabu(&jp(vec![])).provider, None);
        assert_eq!(normalize_jp_minkabu(&jp(vec![""])).provider, None);
    }
}

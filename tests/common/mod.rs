// tests/common/mod.rs
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use news_sync::model::{CnWindRecord, JpMinkabuRecord, SourceRecord};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap()
}

pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

pub fn jp(news_id: &str, updated_at: DateTime<Utc>) -> SourceRecord {
    SourceRecord::JpMinkabu(JpMinkabuRecord {
        id: 0,
        news_id: news_id.to_string(),
        original_headline: format!("見出し {news_id}"),
        original_story: Some("本文".into()),
        translated_headline: format!("Headline {news_id}"),
        translated_story: Some("Body".into()),
        providers: vec!["Minkabu".into(), "Kabutan".into()],
        topics: vec!["market".into()],
        tickers: vec!["7203".into()],
        creation_time: updated_at - Duration::minutes(1),
        model_name: "mt-v2".into(),
        created_at: t0(),
        updated_at,
    })
}

pub fn cn(object_id: &str, updated_at: DateTime<Utc>) -> SourceRecord {
    SourceRecord::CnWind(CnWindRecord {
        id: 0,
        object_id: object_id.to_string(),
        original_title: format!("标题 {object_id}"),
        original_content: Some("正文".into()),
        translated_title: format!("Title {object_id}"),
        translated_content: None,
        publish_date: updated_at - Duration::minutes(2),
        source: Some("Wind".into()),
        sections: vec!["equities".into()],
        wind_codes: vec!["600519.SH".into(), "0700.HK".into()],
        keywords: Some(vec!["liquor".into()]),
        model_name: "mt-v2".into(),
        created_at: t0(),
        updated_at,
    })
}

/// `n` Minkabu records with strictly increasing timestamps, ids zero-padded.
pub fn jp_series(n: usize) -> Vec<SourceRecord> {
    (1..=n)
        .map(|i| jp(&format!("N{i:05}"), at(i as i64)))
        .collect()
}

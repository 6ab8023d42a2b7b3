//! Integration tests for value conversion on SQLite.
//!
//! Tests verify that every supported field kind survives a write and a read,
//! and that NULL and zero stay distinct.

mod common;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use common::sqlite_db;
use rowmap::{Entity, Field, OrmError, Schema, SqlEnum, params};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Status {
    Active,
    Suspended,
}

impl SqlEnum for Status {
    fn variant_name(&self) -> &'static str {
        match self {
            Status::Active => "ACTIVE",
            Status::Suspended => "SUSPENDED",
        }
    }

    fn from_variant_name(name: &str) -> Option<Self> {
        match name {
            "ACTIVE" => Some(Status::Active),
            "SUSPENDED" => Some(Status::Suspended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Preferences {
    theme: String,
    tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Sample {
    id: i64,
    flag: bool,
    tiny: i8,
    small: i16,
    byte: u8,
    word: u16,
    count: u32,
    ratio: f32,
    amount: f64,
    label: Option<String>,
    blob: Option<Vec<u8>>,
    token: Option<Uuid>,
    born_on: Option<NaiveDate>,
    seen_at: Option<NaiveDateTime>,
    created_at: Option<DateTime<Utc>>,
    local_at: Option<DateTime<FixedOffset>>,
    status: Option<Status>,
    prefs: Option<Preferences>,
    scratch: String,
}

impl Entity for Sample {
    fn schema() -> Schema<Self> {
        Schema::new()
            .table("samples")
            .field(Field::scalar("id", |e: &Self| &e.id, |e: &mut Self| &mut e.id))
            .field(Field::scalar("flag", |e: &Self| &e.flag, |e: &mut Self| &mut e.flag))
            .field(Field::scalar("tiny", |e: &Self| &e.tiny, |e: &mut Self| &mut e.tiny))
            .field(Field::scalar("small", |e: &Self| &e.small, |e: &mut Self| &mut e.small))
            .field(Field::scalar("byte", |e: &Self| &e.byte, |e: &mut Self| &mut e.byte))
            .field(Field::scalar("word", |e: &Self| &e.word, |e: &mut Self| &mut e.word))
            .field(Field::scalar("count", |e: &Self| &e.count, |e: &mut Self| &mut e.count))
            .field(Field::scalar("ratio", |e: &Self| &e.ratio, |e: &mut Self| &mut e.ratio))
            .field(Field::scalar("amount", |e: &Self| &e.amount, |e: &mut Self| &mut e.amount))
            .field(Field::scalar("label", |e: &Self| &e.label, |e: &mut Self| &mut e.label))
            .field(Field::scalar("blob", |e: &Self| &e.blob, |e: &mut Self| &mut e.blob))
            .field(Field::scalar("token", |e: &Self| &e.token, |e: &mut Self| &mut e.token))
            .field(Field::scalar("bornOn", |e: &Self| &e.born_on, |e: &mut Self| {
                &mut e.born_on
            }))
            .field(Field::scalar("seenAt", |e: &Self| &e.seen_at, |e: &mut Self| {
                &mut e.seen_at
            }))
            .field(Field::scalar("createdAt", |e: &Self| &e.created_at, |e: &mut Self| {
                &mut e.created_at
            }))
            .field(Field::scalar("localAt", |e: &Self| &e.local_at, |e: &mut Self| {
                &mut e.local_at
            }))
            .field(Field::enumeration("status", |e: &Self| &e.status, |e: &mut Self| {
                &mut e.status
            }))
            .field(Field::json("prefs", |e: &Self| &e.prefs, |e: &mut Self| &mut e.prefs))
            .field(
                Field::scalar("scratch", |e: &Self| &e.scratch, |e: &mut Self| &mut e.scratch)
                    .transient(),
            )
    }
}

const SAMPLES_DDL: &str = "CREATE TABLE samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    flag BOOLEAN NOT NULL,
    tiny INTEGER NOT NULL,
    small INTEGER NOT NULL,
    byte INTEGER NOT NULL,
    word INTEGER NOT NULL,
    count INTEGER NOT NULL,
    ratio REAL NOT NULL,
    amount REAL NOT NULL,
    label TEXT,
    blob BLOB,
    token TEXT,
    born_on TEXT,
    seen_at TEXT,
    created_at TEXT,
    local_at TEXT,
    status TEXT,
    prefs TEXT
)";

fn full_sample() -> Sample {
    let offset = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
    Sample {
        id: 0,
        flag: true,
        tiny: -7,
        small: -1234,
        byte: 255,
        word: 65535,
        count: u32::MAX,
        ratio: 1.5,
        amount: 12345.678,
        label: Some("héllo wörld".into()),
        blob: Some(vec![0, 1, 2, 254, 255]),
        token: Some(Uuid::new_v4()),
        born_on: NaiveDate::from_ymd_opt(1990, 2, 28),
        seen_at: NaiveDate::from_ymd_opt(2024, 3, 1).and_then(|d| d.and_hms_milli_opt(13, 45, 30, 250)),
        created_at: Some(Utc.with_ymd_and_hms(2024, 6, 30, 23, 59, 59).unwrap()),
        local_at: Some(offset.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()),
        status: Some(Status::Suspended),
        prefs: Some(Preferences {
            theme: "dark".into(),
            tags: vec!["a".into(), "b".into()],
        }),
        scratch: String::new(),
    }
}

#[tokio::test]
async fn test_every_kind_round_trips() {
    let t = sqlite_db(&[SAMPLES_DDL]).await;

    let mut sample = full_sample();
    t.db.insert(&mut sample).await.unwrap();

    let loaded = t.db.get_by_id::<Sample>(sample.id).await.unwrap().unwrap();
    assert_eq!(loaded, sample);
    assert_eq!(
        loaded.local_at.unwrap().offset().local_minus_utc(),
        5 * 3600 + 1800,
        "SQLite keeps the originating offset"
    );
}

#[tokio::test]
async fn test_null_and_zero_stay_distinct() {
    let t = sqlite_db(&[SAMPLES_DDL]).await;

    let mut empty = Sample::default();
    t.db.insert(&mut empty).await.unwrap();

    let loaded = t.db.get_by_id::<Sample>(empty.id).await.unwrap().unwrap();
    assert_eq!(loaded, empty);
    assert_eq!(loaded.label, None);
    assert_eq!(loaded.status, None);
    assert_eq!(loaded.prefs, None);

    let nulls = t
        .db
        .list_where::<Sample>("label IS NULL AND token IS NULL AND prefs IS NULL", params![])
        .await
        .unwrap();
    assert_eq!(nulls.len(), 1);

    let zeros = t
        .db
        .list_where::<Sample>("tiny=? AND flag=?", params![0, false])
        .await
        .unwrap();
    assert_eq!(zeros.len(), 1);
}

#[tokio::test]
async fn test_transient_field_is_never_written() {
    let t = sqlite_db(&[SAMPLES_DDL]).await;

    let mut sample = full_sample();
    sample.scratch = "in memory only".into();
    t.db.insert(&mut sample).await.unwrap();

    let loaded = t.db.get_by_id::<Sample>(sample.id).await.unwrap().unwrap();
    assert_eq!(loaded.scratch, "");
    let meta = t.db.metadata::<Sample>().unwrap();
    assert!(meta.field_for_column("scratch").is_none());
}

#[tokio::test]
async fn test_enum_and_json_are_stored_as_text() {
    let t = sqlite_db(&[SAMPLES_DDL]).await;

    let mut sample = full_sample();
    t.db.insert(&mut sample).await.unwrap();

    let by_status = t
        .db
        .list_where::<Sample>("status=?", params!["SUSPENDED"])
        .await
        .unwrap();
    assert_eq!(by_status.len(), 1);

    let themed = t
        .db
        .list_where::<Sample>("json_extract(prefs, '$.theme')=?", params!["dark"])
        .await
        .unwrap();
    assert_eq!(themed.len(), 1);
}

#[tokio::test]
async fn test_unknown_enum_variant_is_a_bind_error() {
    let t = sqlite_db(&[SAMPLES_DDL]).await;

    let mut sample = full_sample();
    t.db.insert(&mut sample).await.unwrap();
    t.db
        .execute("UPDATE samples SET status='RETIRED'", params![])
        .await
        .unwrap();

    let err = t.db.get_by_id::<Sample>(sample.id).await.unwrap_err();
    match err {
        OrmError::Bind { column, message, .. } => {
            assert_eq!(column.as_deref(), Some("status"));
            assert!(message.contains("RETIRED"), "{message}");
        }
        other => panic!("expected bind error, got {other}"),
    }
}

#[tokio::test]
async fn test_out_of_range_column_value_is_rejected() {
    let t = sqlite_db(&[SAMPLES_DDL]).await;

    let mut sample = full_sample();
    t.db.insert(&mut sample).await.unwrap();
    t.db
        .execute("UPDATE samples SET tiny=1000", params![])
        .await
        .unwrap();

    let err = t.db.get_by_id::<Sample>(sample.id).await.unwrap_err();
    assert!(
        matches!(err, OrmError::Bind { ref column, .. } if column.as_deref() == Some("tiny")),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_null_into_required_field_is_rejected() {
    let t = sqlite_db(&[SAMPLES_DDL]).await;

    let rows = t
        .db
        .sql::<Sample>("SELECT NULL AS flag", params![])
        .list()
        .await;
    assert!(matches!(rows, Err(OrmError::Bind { .. })));
}

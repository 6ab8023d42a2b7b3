//! Integration tests for entity mapping on SQLite.
//!
//! Tests verify that:
//! - Caller-built pools work through `Database::from_pool`
//! - Inherited parent fields are persisted with the child
//! - Explicit, non-generated keys are written as given
//! - Metadata is resolved once and mapping errors surface on first use

mod common;

use common::{PERSON_DDL, Person, StatementLog, sqlite_db};
use rowmap::{Database, Entity, Field, OrmError, Schema, params};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq)]
struct Audit {
    created_by: Option<String>,
    revision: i32,
}

impl Entity for Audit {
    fn schema() -> Schema<Self> {
        Schema::new()
            .field(Field::scalar("createdBy", |e: &Self| &e.created_by, |e: &mut Self| {
                &mut e.created_by
            }))
            .field(Field::scalar("revision", |e: &Self| &e.revision, |e: &mut Self| {
                &mut e.revision
            }))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Article {
    audit: Audit,
    id: i64,
    headline: String,
}

impl Entity for Article {
    fn schema() -> Schema<Self> {
        Schema::new()
            .table("articles")
            .field(Field::scalar("id", |e: &Self| &e.id, |e: &mut Self| &mut e.id))
            .field(Field::scalar("headline", |e: &Self| &e.headline, |e: &mut Self| {
                &mut e.headline
            }))
            .inherit(|e: &Self| &e.audit, |e: &mut Self| &mut e.audit)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct UserSession {
    token: Uuid,
    user_name: String,
}

impl Entity for UserSession {
    fn schema() -> Schema<Self> {
        Schema::new()
            .field(
                Field::scalar("token", |e: &Self| &e.token, |e: &mut Self| &mut e.token)
                    .primary_key(),
            )
            .field(Field::scalar("userName", |e: &Self| &e.user_name, |e: &mut Self| {
                &mut e.user_name
            }))
    }
}

#[derive(Debug, Clone, Default)]
struct Counter {
    id: i64,
    hits: u64,
}

impl Entity for Counter {
    fn schema() -> Schema<Self> {
        Schema::new()
            .field(Field::scalar("id", |e: &Self| &e.id, |e: &mut Self| &mut e.id))
            .field(Field::scalar("hits", |e: &Self| &e.hits, |e: &mut Self| &mut e.hits))
    }
}

#[tokio::test]
async fn test_from_pool_uses_caller_pool() {
    let dir = tempfile::tempdir().unwrap();
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("pool.db"))
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    let db = Database::from_pool(pool);
    db.execute(PERSON_DDL, params![]).await.unwrap();
    let mut p = Person::new("pooled", Some(1));
    db.insert(&mut p).await.unwrap();
    assert_eq!(db.get_by_id::<Person>(p.id).await.unwrap(), Some(p));
    db.close().await;
}

#[tokio::test]
async fn test_inherited_fields_are_persisted() {
    let t = sqlite_db(&[
        "CREATE TABLE articles (created_by TEXT, revision INTEGER NOT NULL, id INTEGER PRIMARY KEY AUTOINCREMENT, headline TEXT NOT NULL)",
    ])
    .await;
    let log = StatementLog::default();
    let db = t.db.with_hooks(log.clone());

    let mut article = Article {
        audit: Audit {
            created_by: Some("editor".into()),
            revision: 3,
        },
        headline: "Launch".into(),
        ..Default::default()
    };
    db.insert(&mut article).await.unwrap();
    assert_eq!(
        log.statements()[0],
        "INSERT INTO articles(created_by,revision,headline) VALUES (?,?,?) RETURNING id"
    );

    let loaded = db.get_by_id::<Article>(article.id).await.unwrap().unwrap();
    assert_eq!(loaded, article);

    let by_author = db
        .list_where::<Article>("created_by=?", params!["editor"])
        .await
        .unwrap();
    assert_eq!(by_author.len(), 1);
}

#[tokio::test]
async fn test_explicit_key_is_written_as_given() {
    let t = sqlite_db(&["CREATE TABLE user_session (token TEXT PRIMARY KEY, user_name TEXT NOT NULL)"]).await;
    let log = StatementLog::default();
    let db = t.db.with_hooks(log.clone());

    let mut session = UserSession {
        token: Uuid::new_v4(),
        user_name: "ann".into(),
    };
    db.insert(&mut session).await.unwrap();
    assert_eq!(
        log.statements()[0],
        "INSERT INTO user_session(token,user_name) VALUES (?,?)"
    );

    session.user_name = "ann.b".into();
    db.update(&session).await.unwrap();
    let loaded = db.get_by_id::<UserSession>(session.token).await.unwrap();
    assert_eq!(loaded, Some(session.clone()));

    db.delete::<UserSession>(session.token).await.unwrap();
    assert_eq!(db.get_by_id::<UserSession>(session.token).await.unwrap(), None);
}

#[tokio::test]
async fn test_metadata_is_resolved_once() {
    let t = sqlite_db(&[PERSON_DDL]).await;
    let first = t.db.metadata::<Person>().unwrap();
    let second = t.db.metadata::<Person>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let scoped = t.db.with_hooks(StatementLog::default());
    assert!(Arc::ptr_eq(&first, &scoped.metadata::<Person>().unwrap()));
    assert_eq!(first.table(), "person");
    assert!(first.has_generated_id());
}

#[tokio::test]
async fn test_unsupported_field_kind_fails_on_first_use() {
    let t = sqlite_db(&["CREATE TABLE counter (id INTEGER PRIMARY KEY AUTOINCREMENT, hits INTEGER)"]).await;
    let log = StatementLog::default();
    let db = t.db.with_hooks(log.clone());

    let mut counter = Counter::default();
    let err = db.insert(&mut counter).await.unwrap_err();
    match &err {
        OrmError::Init(init) => {
            assert_eq!(init.type_name, "Counter");
            assert_eq!(init.field, Some("hits"));
        }
        other => panic!("expected init error, got {other}"),
    }
    assert_eq!(log.count(), 0);

    // The failure is cached and reported again without retrying.
    assert!(matches!(db.list_all::<Counter>().await, Err(OrmError::Init(_))));
}

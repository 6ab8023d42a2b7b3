//! Integration tests for the CRUD operations on SQLite.
//!
//! Tests verify that:
//! - Inserted rows read back field for field, including NULLs
//! - Bulk inserts chunk by batch size and assign keys in order
//! - Updates and deletes report missing rows and exact counts
//! - Projection queries and raw SQL hydrate matching fields only

mod common;

use common::{PERSON_DDL, Person, StatementLog, sqlite_db, sqlite_db_with_options};
use futures_util::TryStreamExt;
use rowmap::{OrmError, params};

#[tokio::test]
async fn test_insert_then_get_by_id() {
    let t = sqlite_db(&[PERSON_DDL]).await;

    let mut john = Person::new("John", None);
    t.db.insert(&mut john).await.unwrap();
    assert!(john.id > 0, "generated id should be assigned");

    let loaded = t.db.get_by_id::<Person>(john.id).await.unwrap();
    assert_eq!(loaded, Some(john.clone()));
    assert_eq!(loaded.unwrap().count, None, "unset count must stay NULL, not 0");

    assert_eq!(t.db.get_by_id::<Person>(john.id + 1000).await.unwrap(), None);
}

#[tokio::test]
async fn test_insert_batch_then_list_all() {
    let t = sqlite_db(&[PERSON_DDL]).await;

    let mut people = vec![Person::new("Mary", Some(3)), Person::new("Ann", None)];
    t.db.insert_batch(&mut people).await.unwrap();
    assert!(people[0].id > 0);
    assert_eq!(people[1].id, people[0].id + 1, "keys are assigned in input order");

    let mut all = t.db.list_all::<Person>().await.unwrap();
    all.sort_by_key(|p| p.id);
    assert_eq!(all, people);
}

#[tokio::test]
async fn test_bulk_insert_chunks_by_batch_size() {
    let t = sqlite_db_with_options(&[PERSON_DDL], "?batch_size=1000").await;
    let log = StatementLog::default();
    let db = t.db.with_hooks(log.clone());

    let mut people: Vec<Person> = (0..2500)
        .map(|i| Person::new(&format!("p{i}"), Some(i % 10)))
        .collect();
    db.insert_batch(&mut people).await.unwrap();

    let statements = log.statements();
    assert_eq!(statements.len(), 3);
    assert!(statements.iter().all(|s| s.starts_with("INSERT INTO person(name,count) VALUES ")));

    for pair in people.windows(2) {
        assert_eq!(pair[1].id, pair[0].id + 1);
    }
    let stored = db.list_all::<Person>().await.unwrap();
    assert_eq!(stored.len(), 2500);
    let p1234 = stored.iter().find(|p| p.name == "p1234").unwrap();
    assert_eq!(p1234.id, people[1234].id);
}

#[tokio::test]
async fn test_empty_batch_issues_no_statement() {
    let t = sqlite_db(&[PERSON_DDL]).await;
    let log = StatementLog::default();
    let db = t.db.with_hooks(log.clone());

    let mut nobody: Vec<Person> = Vec::new();
    db.insert_batch(&mut nobody).await.unwrap();
    assert_eq!(log.count(), 0);
}

#[tokio::test]
async fn test_small_batch_size_splits_statements() {
    let t = sqlite_db(&[PERSON_DDL]).await;
    let log = StatementLog::default();
    let db = t.db.with_batch_size(2).with_hooks(log.clone());

    let mut people: Vec<Person> = (0..5).map(|i| Person::new(&format!("p{i}"), None)).collect();
    db.insert_batch(&mut people).await.unwrap();
    assert_eq!(log.count(), 3);
    assert_eq!(db.list_all::<Person>().await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_delete_where_returns_removed_count() {
    let t = sqlite_db(&[PERSON_DDL]).await;
    let mut people: Vec<Person> = (1..=10)
        .map(|i| Person::new(&format!("n{i}"), Some(i)))
        .collect();
    t.db.insert_batch(&mut people).await.unwrap();

    let removed = t
        .db
        .delete_where::<Person>("count>=?", params![7])
        .await
        .unwrap();
    assert_eq!(removed, 4);
    assert_eq!(t.db.list_all::<Person>().await.unwrap().len(), 6);

    let removed = t
        .db
        .delete_where::<Person>("count>=?", params![7])
        .await
        .unwrap();
    assert_eq!(removed, 0);
}

#[tokio::test]
async fn test_update_missing_row_is_not_found() {
    let t = sqlite_db(&[PERSON_DDL]).await;
    let ghost = Person {
        id: 999_999_999,
        name: "Ghost".into(),
        count: None,
    };
    let err = t.db.update(&ghost).await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");
    assert!(matches!(err, OrmError::NotFound { ref table, .. } if table == "person"));
}

#[tokio::test]
async fn test_delete_missing_row_is_not_found() {
    let t = sqlite_db(&[PERSON_DDL]).await;
    let mut p = Person::new("Short-lived", Some(1));
    t.db.insert(&mut p).await.unwrap();

    t.db.delete::<Person>(p.id).await.unwrap();
    let err = t.db.delete::<Person>(p.id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_update_overwrites_with_null() {
    let t = sqlite_db(&[PERSON_DDL]).await;
    let mut p = Person::new("Mary", Some(3));
    t.db.insert(&mut p).await.unwrap();

    p.name = "Mary Ann".into();
    p.count = None;
    t.db.update(&p).await.unwrap();

    let loaded = t.db.get_by_id::<Person>(p.id).await.unwrap().unwrap();
    assert_eq!(loaded.name, "Mary Ann");
    assert_eq!(loaded.count, None);
}

#[tokio::test]
async fn test_update_where_applies_to_matching_rows() {
    let t = sqlite_db(&[PERSON_DDL]).await;
    let mut people = vec![
        Person::new("a", Some(1)),
        Person::new("b", Some(1)),
        Person::new("c", Some(2)),
    ];
    t.db.insert_batch(&mut people).await.unwrap();

    let template = Person::new("renamed", Some(5));
    let changed = t
        .db
        .update_where(&template, "count=?", params![1])
        .await
        .unwrap();
    assert_eq!(changed, 2);

    let renamed = t
        .db
        .list_where::<Person>("name=?", params!["renamed"])
        .await
        .unwrap();
    assert_eq!(renamed.len(), 2);
    assert!(renamed.iter().all(|p| p.count == Some(5)));
}

#[tokio::test]
async fn test_query_builder_filters_and_orders() {
    let t = sqlite_db(&[PERSON_DDL]).await;
    let mut people: Vec<Person> = (1..=6)
        .map(|i| Person::new(&format!("n{i}"), Some(i)))
        .collect();
    t.db.insert_batch(&mut people).await.unwrap();

    let picked = t
        .db
        .query::<Person>()
        .filter("count>? AND count<?", params![1, 5])
        .order_by("count DESC")
        .list()
        .await
        .unwrap();
    let counts: Vec<_> = picked.iter().map(|p| p.count.unwrap()).collect();
    assert_eq!(counts, vec![4, 3, 2]);

    let first = t
        .db
        .filter::<Person>("count>=?", params![5])
        .order_by("count")
        .fetch()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.name, "n5");

    let none = t
        .db
        .filter::<Person>("count>?", params![100])
        .fetch()
        .await
        .unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn test_projection_skips_missing_columns() {
    let t = sqlite_db(&[PERSON_DDL]).await;
    let mut p = Person::new("Projected", Some(9));
    t.db.insert(&mut p).await.unwrap();

    let rows = t
        .db
        .sql::<Person>("SELECT name, 'extra' AS unrelated FROM person", params![])
        .list()
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "Projected");
    assert_eq!(rows[0].id, 0);
    assert_eq!(rows[0].count, None);
}

#[tokio::test]
async fn test_grouped_raw_query() {
    let t = sqlite_db(&[PERSON_DDL]).await;
    let mut people = vec![
        Person::new("x", Some(1)),
        Person::new("x", Some(2)),
        Person::new("y", Some(4)),
    ];
    t.db.insert_batch(&mut people).await.unwrap();

    let totals = t
        .db
        .sql::<Person>("SELECT name, SUM(count) AS count FROM person", params![])
        .group_by("name")
        .order_by("name")
        .list()
        .await
        .unwrap();
    let pairs: Vec<_> = totals.iter().map(|p| (p.name.as_str(), p.count)).collect();
    assert_eq!(pairs, vec![("x", Some(3)), ("y", Some(4))]);
}

#[tokio::test]
async fn test_stream_yields_every_row() {
    let t = sqlite_db(&[PERSON_DDL]).await;
    let mut people: Vec<Person> = (0..4).map(|i| Person::new(&format!("s{i}"), None)).collect();
    t.db.insert_batch(&mut people).await.unwrap();

    let streamed: Vec<Person> = t
        .db
        .query::<Person>()
        .order_by("id")
        .stream()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(streamed, people);
}

#[tokio::test]
async fn test_raw_execute_returns_affected_rows() {
    let t = sqlite_db(&[PERSON_DDL]).await;
    let mut people = vec![Person::new("a", Some(1)), Person::new("b", Some(2))];
    t.db.insert_batch(&mut people).await.unwrap();

    let n = t
        .db
        .execute("UPDATE person SET count = count + ?", params![10])
        .await
        .unwrap();
    assert_eq!(n, 2);
}

#[tokio::test]
async fn test_driver_errors_propagate() {
    let t = sqlite_db(&[PERSON_DDL]).await;
    let err = t
        .db
        .list_where::<Person>("no_such_column=?", params![1])
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Driver(_)), "unexpected error: {err}");
}

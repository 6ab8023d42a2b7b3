//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use rowmap::{Database, Entity, Field, Hooks, Schema, params};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// A database on a fresh SQLite file. The file is removed when this is
/// dropped.
pub struct TestDb {
    pub db: Database,
    pub url: String,
    _dir: TempDir,
}

pub async fn sqlite_db(ddl: &[&str]) -> TestDb {
    sqlite_db_with_options(ddl, "").await
}

/// Like [`sqlite_db`] with extra URL query options, e.g. `?batch_size=10`.
pub async fn sqlite_db_with_options(ddl: &[&str], options: &str) -> TestDb {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.db");
    let url = format!("sqlite:{}{}", path.display(), options);
    let db = Database::connect(&url).await.unwrap();
    for statement in ddl {
        db.execute(statement, params![]).await.unwrap();
    }
    TestDb {
        db,
        url,
        _dir: dir,
    }
}

pub const PERSON_DDL: &str =
    "CREATE TABLE person (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, count INTEGER)";

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub count: Option<i32>,
}

impl Person {
    pub fn new(name: &str, count: Option<i32>) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            count,
        }
    }
}

impl Entity for Person {
    fn schema() -> Schema<Self> {
        Schema::new()
            .field(Field::scalar("id", |e: &Self| &e.id, |e: &mut Self| &mut e.id))
            .field(Field::scalar("name", |e: &Self| &e.name, |e: &mut Self| &mut e.name))
            .field(Field::scalar("count", |e: &Self| &e.count, |e: &mut Self| &mut e.count))
    }
}

/// Records every statement the database runs.
#[derive(Clone, Default)]
pub struct StatementLog {
    statements: Arc<Mutex<Vec<String>>>,
}

impl StatementLog {
    pub fn count(&self) -> usize {
        self.statements.lock().unwrap().len()
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.statements.lock().unwrap().clear();
    }
}

impl Hooks for StatementLog {
    fn on_statement(&self, sql: &str) {
        self.statements.lock().unwrap().push(sql.to_string());
    }
}

use std::fmt;

use anyhow::{Context, Result};
use err_derive::Error;
use log::*;
use postgres::{Client, NoTls};
use r2d2::ManageConnection;
use r2d2_postgres::PostgresConnectionManager;

use crate::ids::{Entity, Id};

#[derive(Debug, Error, PartialEq, Eq)]
#[error(display = "no {} document with id {}", kind, id)]
pub struct MissingDocument {
    pub kind: &'static str,
    pub id: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(display = "invalid document: {}", _0)]
pub struct InvalidDocument(pub String);

/// Record storage, as handed out by a connection pool.
pub trait Storage {
    fn setup(&mut self) -> Result<()>;
    /// Every record of kind `D`, ordered by id.
    fn list<D: Entity>(&mut self) -> Result<Vec<(Id<D>, D)>>;
    fn load<D: Entity>(&mut self, id: &Id<D>) -> Result<Option<D>>;
    fn insert<D: Entity>(&mut self, document: &D) -> Result<Id<D>>;
    /// Fails with `MissingDocument` if `id` does not resolve.
    fn save<D: Entity>(&mut self, id: &Id<D>, document: &D) -> Result<()>;
    /// Returns whether anything was removed.
    fn delete<D: Entity>(&mut self, id: &Id<D>) -> Result<bool>;
}

pub struct Documents {
    client: Client,
}

pub struct DocumentConnectionManager {
    inner: PostgresConnectionManager<NoTls>,
}

const SETUP_SQL: &str = include_str!("persistence.sql");
const LIST_SQL: &str = "SELECT id, body FROM documents WHERE kind = $1 ORDER BY id ASC";
const LOAD_SQL: &str = "SELECT body FROM documents WHERE kind = $1 AND id = $2";
const INSERT_SQL: &str = "INSERT INTO documents (kind, body) VALUES ($1, $2) RETURNING id";
const SAVE_SQL: &str = "UPDATE documents SET body = $3 WHERE kind = $1 AND id = $2";
const DELETE_SQL: &str = "DELETE FROM documents WHERE kind = $1 AND id = $2";

impl Documents {
    pub fn wrap(client: Client) -> Self {
        Documents { client }
    }

    pub fn get_ref(&mut self) -> &mut Client {
        &mut self.client
    }
}

impl Storage for Documents {
    fn setup(&mut self) -> Result<()> {
        self.client.batch_execute(SETUP_SQL)?;
        Ok(())
    }

    fn list<D: Entity>(&mut self) -> Result<Vec<(Id<D>, D)>> {
        let rows = self.client.query(LIST_SQL, &[&D::PREFIX])?;
        debug!("Loaded {} {} rows", rows.len(), D::PREFIX);
        rows.iter()
            .map(|row| -> Result<(Id<D>, D)> {
                let id: i64 = row.try_get(0)?;
                let json: serde_json::Value = row.try_get(1)?;
                let doc = serde_json::from_value(json)
                    .with_context(|| format!("decode {} {}", D::PREFIX, id))?;
                Ok((Id::of(id), doc))
            })
            .collect()
    }

    fn load<D: Entity>(&mut self, id: &Id<D>) -> Result<Option<D>> {
        let row = self
            .client
            .query_opt(LOAD_SQL, &[&D::PREFIX, &id.value()])?;

        if let Some(row) = row {
            let json: serde_json::Value = row.try_get(0)?;
            let doc = serde_json::from_value(json)
                .with_context(|| format!("decode {} {}", D::PREFIX, id))?;
            Ok(Some(doc))
        } else {
            Ok(None)
        }
    }

    fn insert<D: Entity>(&mut self, document: &D) -> Result<Id<D>> {
        document.validate()?;
        let json = serde_json::to_value(document)?;
        let row = self.client.query_one(INSERT_SQL, &[&D::PREFIX, &json])?;
        let id: i64 = row.try_get(0)?;
        debug!("Inserted {} {}", D::PREFIX, id);
        Ok(Id::of(id))
    }

    fn save<D: Entity>(&mut self, id: &Id<D>, document: &D) -> Result<()> {
        document.validate()?;
        let json = serde_json::to_value(document)?;
        let nrows = self
            .client
            .execute(SAVE_SQL, &[&D::PREFIX, &id.value(), &json])?;
        debug!("Save modified {} rows", nrows);
        if nrows != 1 {
            warn!("Update impacted {} rows not 1", nrows);
            return Err(MissingDocument {
                kind: D::PREFIX,
                id: id.value(),
            }
            .into());
        }
        Ok(())
    }

    fn delete<D: Entity>(&mut self, id: &Id<D>) -> Result<bool> {
        let nrows = self
            .client
            .execute(DELETE_SQL, &[&D::PREFIX, &id.value()])?;
        debug!("Delete removed {} rows", nrows);
        Ok(nrows > 0)
    }
}

impl DocumentConnectionManager {
    pub fn new(inner: PostgresConnectionManager<NoTls>) -> Self {
        DocumentConnectionManager { inner }
    }

    pub fn from_url(url: &str) -> Result<Self> {
        let config = url.parse::<postgres::Config>().context("parse postgres url")?;
        Ok(Self::new(PostgresConnectionManager::new(config, NoTls)))
    }
}

impl ManageConnection for DocumentConnectionManager {
    type Connection = Documents;
    type Error = postgres::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.inner.connect().map(Documents::wrap)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        self.inner.is_valid(&mut conn.client)
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        self.inner.has_broken(&mut conn.client)
    }
}

impl fmt::Debug for DocumentConnectionManager {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("DocumentConnectionManager").finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use r2d2::Pool;
    use serde::{Deserialize, Serialize};
    use std::env;

    const DEFAULT_URL: &str = "postgres://postgres@localhost/";

    #[derive(Debug)]
    struct UseTempSchema(String);

    impl r2d2::CustomizeConnection<Documents, postgres::Error> for UseTempSchema {
        fn on_acquire(&self, conn: &mut Documents) -> Result<(), postgres::Error> {
            loop {
                let mut t = conn.get_ref().transaction()?;
                let nschemas: i64 = t
                    .query_one(
                        "SELECT count(*) from pg_catalog.pg_namespace n where n.nspname = $1",
                        &[&self.0],
                    )?
                    .get(0);
                debug!("Number of {} schemas:{}", self.0, nschemas);
                if nschemas == 0 {
                    match t.batch_execute(&format!("CREATE SCHEMA \"{}\"", self.0)) {
                        Ok(_) => {
                            t.commit()?;
                            break;
                        }
                        Err(e) => warn!("Error creating schema:{:?}: {:?}", self.0, e),
                    }
                } else {
                    break;
                }
            }
            conn.get_ref()
                .batch_execute(&format!("SET search_path TO \"{}\"", self.0))?;
            Ok(())
        }
    }

    fn pool(schema: &str) -> Pool<DocumentConnectionManager> {
        debug!("Build pool for {}", schema);
        let url = env::var("POSTGRES_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
        let manager = DocumentConnectionManager::from_url(&url).expect("postgres");
        let pool = r2d2::Pool::builder()
            .max_size(2)
            .connection_customizer(Box::new(UseTempSchema(schema.to_string())))
            .build(manager)
            .expect("pool");
        let mut conn = pool.get().expect("temp connection");

        debug!("Clean old tables in {}", schema);
        conn.get_ref()
            .batch_execute("DROP TABLE IF EXISTS documents")
            .expect("drop table");

        debug!("Init schema in {}", schema);
        conn.setup().expect("setup");

        pool
    }

    #[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, Default)]
    struct ADocument {
        name: String,
    }
    impl Entity for ADocument {
        const PREFIX: &'static str = "adocument";
        fn validate(&self) -> Result<(), InvalidDocument> {
            if self.name.is_empty() {
                return Err(InvalidDocument("empty name".into()));
            }
            Ok(())
        }
    }

    fn doc(name: &str) -> ADocument {
        ADocument {
            name: name.to_string(),
        }
    }

    #[test]
    #[ignore]
    fn load_missing_document_should_return_none() {
        env_logger::try_init().unwrap_or_default();
        let pool = pool("load_missing_document_should_return_none");
        let mut docs = pool.get().expect("temp connection");

        let loaded = docs.load::<ADocument>(&Id::of(12345)).expect("load");
        info!("Loaded document: {:?}", loaded);

        assert_eq!(None, loaded);
    }

    #[test]
    #[ignore]
    fn insert_load() {
        env_logger::try_init().unwrap_or_default();
        let pool = pool("insert_load");
        let mut docs = pool.get().expect("temp connection");

        docs.insert(&doc("Before")).expect("insert");
        let id = docs.insert(&doc("Dave")).expect("insert");
        docs.insert(&doc("After")).expect("insert");

        let loaded = docs.load(&id).expect("load");
        info!("Loaded document: {:?}", loaded);

        assert_eq!(Some(doc("Dave")), loaded);
    }

    #[test]
    #[ignore]
    fn list_should_be_ordered_by_id() {
        env_logger::try_init().unwrap_or_default();
        let pool = pool("list_should_be_ordered_by_id");
        let mut docs = pool.get().expect("temp connection");

        let a = docs.insert(&doc("a")).expect("insert");
        let b = docs.insert(&doc("b")).expect("insert");

        let listed = docs.list::<ADocument>().expect("list");
        assert_eq!(listed, vec![(a, doc("a")), (b, doc("b"))]);
    }

    #[test]
    #[ignore]
    fn should_update_on_save() {
        env_logger::try_init().unwrap_or_default();
        let pool = pool("should_update_on_save");
        let mut docs = pool.get().expect("temp connection");

        let id = docs.insert(&doc("Version 1")).expect("insert");
        docs.save(&id, &doc("Version 2")).expect("save modified");

        let loaded = docs.load(&id).expect("load");
        assert_eq!(Some(doc("Version 2")), loaded);
    }

    #[test]
    #[ignore]
    fn should_fail_on_save_of_missing_document() {
        env_logger::try_init().unwrap_or_default();
        let pool = pool("should_fail_on_save_of_missing_document");
        let mut docs = pool.get().expect("temp connection");

        let err = docs
            .save(&Id::of(999), &doc("Ghost"))
            .expect_err("save should fail");

        assert!(
            err.downcast_ref::<MissingDocument>().is_some(),
            "Error: {:?}",
            err
        );
    }

    #[test]
    #[ignore]
    fn should_refuse_invalid_documents() {
        env_logger::try_init().unwrap_or_default();
        let pool = pool("should_refuse_invalid_documents");
        let mut docs = pool.get().expect("temp connection");

        let err = docs.insert(&doc("")).expect_err("insert should fail");
        assert!(err.downcast_ref::<InvalidDocument>().is_some());
        assert!(docs.list::<ADocument>().expect("list").is_empty());
    }

    #[test]
    #[ignore]
    fn delete_twice() {
        env_logger::try_init().unwrap_or_default();
        let pool = pool("delete_twice");
        let mut docs = pool.get().expect("temp connection");

        let id = docs.insert(&doc("Short lived")).expect("insert");
        assert!(docs.delete(&id).expect("delete"));
        assert!(!docs.delete(&id).expect("delete again"));
        assert_eq!(None, docs.load(&id).expect("load"));
    }
}

//! An in-process `Storage`, pooled the same way as the Postgres one.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use err_derive::Error;
use log::*;

use crate::ids::{Entity, Id};
use crate::persistence::{MissingDocument, Storage};

#[derive(Debug, Error)]
#[error(display = "memory store lock poisoned")]
pub struct Poisoned;

#[derive(Debug, Default)]
struct Tables {
    last_id: i64,
    docs: BTreeMap<(&'static str, i64), serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryConnectionManager {
    tables: Arc<Mutex<Tables>>,
}

#[derive(Debug)]
pub struct MemoryDocuments {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }
}

impl r2d2::ManageConnection for MemoryConnectionManager {
    type Connection = MemoryDocuments;
    type Error = Poisoned;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let tables = self.tables.clone();
        Ok(MemoryDocuments { tables })
    }

    fn is_valid(&self, _: &mut Self::Connection) -> Result<(), Self::Error> {
        Ok(())
    }

    fn has_broken(&self, _: &mut Self::Connection) -> bool {
        false
    }
}

impl MemoryDocuments {
    fn tables(&self) -> Result<MutexGuard<Tables>, Poisoned> {
        self.tables.lock().map_err(|_| Poisoned)
    }
}

impl Storage for MemoryDocuments {
    fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    fn list<D: Entity>(&mut self) -> Result<Vec<(Id<D>, D)>> {
        let tables = self.tables()?;
        tables
            .docs
            .range((D::PREFIX, i64::MIN)..=(D::PREFIX, i64::MAX))
            .map(|(&(_, id), json)| -> Result<(Id<D>, D)> {
                let doc = serde_json::from_value(json.clone())
                    .with_context(|| format!("decode {} {}", D::PREFIX, id))?;
                Ok((Id::of(id), doc))
            })
            .collect()
    }

    fn load<D: Entity>(&mut self, id: &Id<D>) -> Result<Option<D>> {
        let tables = self.tables()?;
        match tables.docs.get(&(D::PREFIX, id.value())) {
            Some(json) => Ok(Some(serde_json::from_value(json.clone())?)),
            None => Ok(None),
        }
    }

    fn insert<D: Entity>(&mut self, document: &D) -> Result<Id<D>> {
        document.validate()?;
        let json = serde_json::to_value(document)?;
        let mut tables = self.tables()?;
        tables.last_id += 1;
        let id = tables.last_id;
        tables.docs.insert((D::PREFIX, id), json);
        debug!("Inserted {} {}", D::PREFIX, id);
        Ok(Id::of(id))
    }

    fn save<D: Entity>(&mut self, id: &Id<D>, document: &D) -> Result<()> {
        document.validate()?;
        let json = serde_json::to_value(document)?;
        let mut tables = self.tables()?;
        match tables.docs.get_mut(&(D::PREFIX, id.value())) {
            Some(slot) => {
                *slot = json;
                Ok(())
            }
            None => Err(MissingDocument {
                kind: D::PREFIX,
                id: id.value(),
            }
            .into()),
        }
    }

    fn delete<D: Entity>(&mut self, id: &Id<D>) -> Result<bool> {
        let mut tables = self.tables()?;
        Ok(tables.docs.remove(&(D::PREFIX, id.value())).is_some())
    }
}

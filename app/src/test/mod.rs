//! Guarded with `#[cfg(test)]` from `lib.rs`

use std::sync::Arc;

use anyhow::Result;
use r2d2::{ManageConnection, Pool};
use serde_json::json;

use crate::auth::{AuthError, Claims, TokenVerifier};
use crate::drinks::{
    CreateDrink, DeleteDrink, Drink, DrinkPatch, Drinks, Ingredient, ListDrinks, LoadDrink,
    UpdateDrink,
};
use crate::services::{Commandable, Queryable};
use crate::CoffeeShop;
use infra::ids::{Entity, Id};
use infra::memory::{MemoryConnectionManager, MemoryDocuments, Poisoned};
use infra::persistence::Storage;

struct NobodyGetsIn;

impl TokenVerifier for NobodyGetsIn {
    fn verify(&self, _: &str) -> Result<Claims, AuthError> {
        Err(AuthError::InvalidSignature)
    }
}

fn shop() -> Result<CoffeeShop<MemoryConnectionManager>> {
    env_logger::try_init().unwrap_or_default();
    let db = Pool::builder()
        .max_size(2)
        .build(MemoryConnectionManager::new())?;
    CoffeeShop::new(db, Arc::new(NobodyGetsIn))
}

fn recipe(name: &str) -> Vec<Ingredient> {
    serde_json::from_value(json!([{"name": name, "color": "brown", "parts": 2}]))
        .expect("ingredients")
}

#[test]
fn create_update_delete_as_transaction_script() -> Result<()> {
    let shop = shop()?;
    let drinks = shop.drinks();

    let latte = Drink::new("Latte", &recipe("espresso"))?;
    let id = drinks.execute(CreateDrink {
        drink: latte.clone(),
    })?;
    assert_eq!(drinks.query(LoadDrink { id })?, Some(latte));

    let patch = DrinkPatch {
        title: Some("Flat white".into()),
        recipe: None,
    };
    let updated = drinks
        .execute(UpdateDrink { id, patch })?
        .expect("drink to update");
    assert_eq!(updated.title(), "Flat white");
    assert_eq!(updated.recipe()?, recipe("espresso"));

    assert!(drinks.execute(DeleteDrink { id })?);
    assert!(!drinks.execute(DeleteDrink { id })?);
    assert_eq!(drinks.query(LoadDrink { id })?, None);
    Ok(())
}

#[test]
fn listing_is_ordered_by_id() -> Result<()> {
    let shop = shop()?;
    let drinks = shop.drinks();
    let mut ids = Vec::new();
    for title in &["Mocha", "Americano", "Cappuccino"] {
        let drink = Drink::new(title, &recipe("espresso"))?;
        ids.push(drinks.execute(CreateDrink { drink })?);
    }

    let listed = drinks.query(ListDrinks)?;

    assert_eq!(listed.iter().map(|(id, _)| *id).collect::<Vec<_>>(), ids);
    Ok(())
}

#[test]
fn updating_unknown_drink_creates_nothing() -> Result<()> {
    let shop = shop()?;
    let drinks = shop.drinks();

    let res = drinks.execute(UpdateDrink {
        id: Id::of(41),
        patch: DrinkPatch {
            title: Some("Ghost".into()),
            recipe: Some(recipe("ectoplasm")),
        },
    })?;

    assert_eq!(res, None);
    assert!(drinks.query(ListDrinks)?.is_empty());
    Ok(())
}

#[test]
fn emptying_a_title_is_refused_by_the_store() -> Result<()> {
    let shop = shop()?;
    let drinks = shop.drinks();
    let drink = Drink::new("Espresso", &recipe("espresso"))?;
    let id = drinks.execute(CreateDrink {
        drink: drink.clone(),
    })?;

    let res = drinks.execute(UpdateDrink {
        id,
        patch: DrinkPatch {
            title: Some(String::new()),
            recipe: None,
        },
    });

    assert!(res.is_err(), "{:?}", res);
    assert_eq!(drinks.query(LoadDrink { id })?, Some(drink));
    Ok(())
}

/// Storage where every record is deleted by someone else just before a save.
struct DeletedUnderfoot(MemoryDocuments);

#[derive(Debug, Default)]
struct DeletedUnderfootManager(MemoryConnectionManager);

impl Storage for DeletedUnderfoot {
    fn setup(&mut self) -> Result<()> {
        self.0.setup()
    }
    fn list<D: Entity>(&mut self) -> Result<Vec<(Id<D>, D)>> {
        self.0.list()
    }
    fn load<D: Entity>(&mut self, id: &Id<D>) -> Result<Option<D>> {
        self.0.load(id)
    }
    fn insert<D: Entity>(&mut self, document: &D) -> Result<Id<D>> {
        self.0.insert(document)
    }
    fn save<D: Entity>(&mut self, id: &Id<D>, document: &D) -> Result<()> {
        self.0.delete(id)?;
        self.0.save(id, document)
    }
    fn delete<D: Entity>(&mut self, id: &Id<D>) -> Result<bool> {
        self.0.delete(id)
    }
}

impl ManageConnection for DeletedUnderfootManager {
    type Connection = DeletedUnderfoot;
    type Error = Poisoned;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.0.connect().map(DeletedUnderfoot)
    }

    fn is_valid(&self, _: &mut Self::Connection) -> Result<(), Self::Error> {
        Ok(())
    }

    fn has_broken(&self, _: &mut Self::Connection) -> bool {
        false
    }
}

#[test]
fn drink_deleted_during_update_is_reported_missing() -> Result<()> {
    env_logger::try_init().unwrap_or_default();
    let db = Pool::builder()
        .max_size(1)
        .build(DeletedUnderfootManager::default())?;
    let drinks = Drinks::new(db);
    let drink = Drink::new("Macchiato", &recipe("espresso"))?;
    let id = drinks.execute(CreateDrink { drink })?;

    let res = drinks.execute(UpdateDrink {
        id,
        patch: DrinkPatch {
            title: Some("Latte macchiato".into()),
            recipe: None,
        },
    })?;

    assert_eq!(res, None);
    assert!(drinks.query(ListDrinks)?.is_empty());
    Ok(())
}

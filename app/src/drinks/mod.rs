use anyhow::{Context, Result};
use log::*;
use r2d2::Pool;

use infra::ids::Id;
use infra::persistence::{MissingDocument, Storage};

use crate::services::{Commandable, Queryable, Request};

mod models;
mod resources;

pub use self::models::{
    Drink, DrinkPatch, Ingredient, LongDrink, NewDrink, ShortDrink, ShortIngredient,
};
pub use self::resources::DrinkResources;

#[derive(Debug)]
pub struct Drinks<M: r2d2::ManageConnection> {
    db: Pool<M>,
}

/// Every drink, ordered by id.
#[derive(Debug, Clone, Copy)]
pub struct ListDrinks;

#[derive(Debug, Clone, Copy)]
pub struct LoadDrink {
    pub id: Id<Drink>,
}

#[derive(Debug, Clone)]
pub struct CreateDrink {
    pub drink: Drink,
}

/// Resolves to `None` when there is no such drink.
#[derive(Debug, Clone)]
pub struct UpdateDrink {
    pub id: Id<Drink>,
    pub patch: DrinkPatch,
}

/// Resolves to `false` when there is no such drink.
#[derive(Debug, Clone, Copy)]
pub struct DeleteDrink {
    pub id: Id<Drink>,
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> Drinks<M> {
    pub fn new(db: Pool<M>) -> Self {
        Drinks { db }
    }

    pub fn setup(&self) -> Result<()> {
        debug!("Init schema");
        self.db.get()?.setup().context("Setup persistence")?;
        Ok(())
    }
}

impl<M: r2d2::ManageConnection> Clone for Drinks<M> {
    fn clone(&self) -> Self {
        let db = self.db.clone();
        Drinks { db }
    }
}

impl Request for ListDrinks {
    type Resp = Vec<(Id<Drink>, Drink)>;
}

impl Request for LoadDrink {
    type Resp = Option<Drink>;
}

impl Request for CreateDrink {
    type Resp = Id<Drink>;
}

impl Request for UpdateDrink {
    type Resp = Option<Drink>;
}

impl Request for DeleteDrink {
    type Resp = bool;
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<ListDrinks> for Drinks<M>
{
    fn query(&self, _: ListDrinks) -> Result<Vec<(Id<Drink>, Drink)>> {
        let drinks = self.db.get()?.list::<Drink>().context("list drinks")?;
        debug!("Listed {} drinks", drinks.len());
        Ok(drinks)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Queryable<LoadDrink> for Drinks<M>
{
    fn query(&self, req: LoadDrink) -> Result<Option<Drink>> {
        let res = self.db.get()?.load(&req.id)?;
        debug!("Load {} -> {:?}", req.id, res);
        Ok(res)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<CreateDrink> for Drinks<M>
{
    fn execute(&self, req: CreateDrink) -> Result<Id<Drink>> {
        let id = self.db.get()?.insert(&req.drink).context("insert drink")?;
        info!("Created drink {}: {:?}", id, req.drink.title());
        Ok(id)
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<UpdateDrink> for Drinks<M>
{
    fn execute(&self, req: UpdateDrink) -> Result<Option<Drink>> {
        let UpdateDrink { id, patch } = req;
        let mut docs = self.db.get()?;
        let mut drink = match docs.load::<Drink>(&id)? {
            Some(drink) => drink,
            None => {
                debug!("No drink {} to update", id);
                return Ok(None);
            }
        };
        drink.apply(patch)?;
        match docs.save(&id, &drink) {
            Ok(()) => {}
            Err(e) if e.downcast_ref::<MissingDocument>().is_some() => {
                debug!("Drink {} vanished before update: {}", id, e);
                return Ok(None);
            }
            Err(e) => return Err(e.context("save drink")),
        }
        info!("Updated drink {}", id);
        Ok(Some(drink))
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static>
    Commandable<DeleteDrink> for Drinks<M>
{
    fn execute(&self, req: DeleteDrink) -> Result<bool> {
        let mut docs = self.db.get()?;
        if docs.load::<Drink>(&req.id)?.is_none() {
            debug!("No drink {} to delete", req.id);
            return Ok(false);
        }
        let removed = docs.delete(&req.id).context("delete drink")?;
        info!("Deleted drink {}", req.id);
        Ok(removed)
    }
}

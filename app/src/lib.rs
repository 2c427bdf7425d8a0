use std::sync::Arc;

use actix_web::web;
use anyhow::Result;
use log::*;
use r2d2::Pool;

use infra::persistence::{DocumentConnectionManager, Storage};

pub mod auth;
pub mod config;
pub mod drinks;
pub mod errors;
pub mod services;

#[cfg(test)]
mod test;

use crate::auth::{JwtVerifier, PermissionGate, TokenVerifier};
use crate::drinks::{DrinkResources, Drinks};

#[derive(Debug)]
pub struct CoffeeShop<M: r2d2::ManageConnection> {
    drinks: Drinks<M>,
    resources: DrinkResources<M>,
}

impl CoffeeShop<DocumentConnectionManager> {
    pub fn from_config(config: &config::Config) -> Result<Self> {
        let db = config.postgres.build()?;
        let verifier = JwtVerifier::from_config(&config.auth)?;
        Self::new(db, Arc::new(verifier))
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> CoffeeShop<M> {
    pub fn new(db: Pool<M>, verifier: Arc<dyn TokenVerifier>) -> Result<Self> {
        let drinks = Drinks::new(db);
        drinks.setup()?;

        let gate = PermissionGate::new(verifier);
        let resources = DrinkResources::new(drinks.clone(), gate);
        Ok(CoffeeShop { drinks, resources })
    }

    pub fn drinks(&self) -> &Drinks<M> {
        &self.drinks
    }

    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        info!("Booting coffeeshop");
        self.resources.configure(cfg);
        cfg.service(web::resource("/{tail:.*}").to(errors::not_found));
    }
}

impl<M: r2d2::ManageConnection> Clone for CoffeeShop<M> {
    fn clone(&self) -> Self {
        let drinks = self.drinks.clone();
        let resources = self.resources.clone();
        CoffeeShop { drinks, resources }
    }
}

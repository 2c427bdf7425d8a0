use actix_web::web::{self, Bytes};
use actix_web::{HttpRequest, HttpResponse};
use log::*;
use serde::Serialize;

use infra::ids::Id;
use infra::persistence::Storage;

use super::models::{Drink, DrinkPatch, NewDrink};
use super::{CreateDrink, DeleteDrink, Drinks, ListDrinks, LoadDrink, UpdateDrink};
use crate::auth::{permissions, PermissionGate};
use crate::errors::ApiError;
use crate::services::{Commandable, Queryable};

const PREFIX: &str = "/drinks";

#[derive(Debug)]
pub struct DrinkResources<M: r2d2::ManageConnection> {
    drinks: Drinks<M>,
    gate: PermissionGate,
}

#[derive(Serialize, Debug)]
struct DrinksBody<T> {
    success: bool,
    drinks: T,
}

/// `delete` echoes the path segment exactly as the caller wrote it.
#[derive(Serialize, Debug)]
struct DeletedBody {
    success: bool,
    delete: String,
}

impl<T> DrinksBody<T> {
    fn of(drinks: T) -> Self {
        DrinksBody {
            success: true,
            drinks,
        }
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: Storage + Send + 'static> DrinkResources<M> {
    pub fn new(drinks: Drinks<M>, gate: PermissionGate) -> Self {
        DrinkResources { drinks, gate }
    }

    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.service(
            web::resource(PREFIX)
                .route(web::get().to({
                    let me = self.clone();
                    move || me.clone().index()
                }))
                .route(web::post().to({
                    let me = self.clone();
                    move |req: HttpRequest, body: Bytes| me.clone().create(req, body)
                })),
        )
        .service(web::resource("/drinks-detail").route(web::get().to({
            let me = self.clone();
            move |req: HttpRequest| me.clone().detail(req)
        })))
        .service(
            web::resource(format!("{}/{{id}}", PREFIX))
                .route(web::patch().to({
                    let me = self.clone();
                    move |req: HttpRequest, id: web::Path<String>, body: Bytes| {
                        me.clone().update(req, id.into_inner(), body)
                    }
                }))
                .route(web::delete().to({
                    let me = self.clone();
                    move |req: HttpRequest, id: web::Path<String>| {
                        me.clone().delete(req, id.into_inner())
                    }
                })),
        );
    }

    async fn index(self) -> Result<HttpResponse, ApiError> {
        debug!("Handle index");
        let drinks = self
            .in_pool(|drinks| drinks.query(ListDrinks))
            .await?
            .iter()
            .map(|(id, drink)| drink.short(*id))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(HttpResponse::Ok().json(DrinksBody::of(drinks)))
    }

    async fn detail(self, req: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.gate.authorize(permissions::GET_DRINKS_DETAIL, &req)?;
        let drinks = self
            .in_pool(|drinks| drinks.query(ListDrinks))
            .await?
            .iter()
            .map(|(id, drink)| drink.long(*id))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(HttpResponse::Ok().json(DrinksBody::of(drinks)))
    }

    async fn create(self, req: HttpRequest, body: Bytes) -> Result<HttpResponse, ApiError> {
        self.gate.authorize(permissions::POST_DRINKS, &req)?;
        let new: NewDrink = serde_json::from_slice(&body).map_err(|e| {
            debug!("Unreadable drink: {}", e);
            ApiError::InvalidInput
        })?;
        let drink = new.into_drink()?.ok_or(ApiError::InvalidInput)?;

        let created = drink.clone();
        let id = self
            .in_pool(move |drinks| drinks.execute(CreateDrink { drink: created }))
            .await?;
        Ok(HttpResponse::Ok().json(DrinksBody::of(drink.long(id)?)))
    }

    async fn update(
        self,
        req: HttpRequest,
        id: String,
        body: Bytes,
    ) -> Result<HttpResponse, ApiError> {
        self.gate.authorize(permissions::PATCH_DRINKS, &req)?;
        let id = parse_id(&id)?;
        let patch = if body.is_empty() {
            DrinkPatch::default()
        } else {
            match serde_json::from_slice::<DrinkPatch>(&body) {
                Ok(patch) => patch,
                Err(e) => {
                    debug!("Unreadable patch for {}: {}", id, e);
                    let existing = self
                        .in_pool(move |drinks| drinks.query(LoadDrink { id }))
                        .await?;
                    return Err(match existing {
                        Some(_) => ApiError::InvalidInput,
                        None => ApiError::NotFound,
                    });
                }
            }
        };

        let drink = self
            .in_pool(move |drinks| drinks.execute(UpdateDrink { id, patch }))
            .await?
            .ok_or(ApiError::NotFound)?;
        Ok(HttpResponse::Ok().json(DrinksBody::of(vec![drink.long(id)?])))
    }

    async fn delete(self, req: HttpRequest, id: String) -> Result<HttpResponse, ApiError> {
        self.gate.authorize(permissions::DELETE_DRINKS, &req)?;
        let drink_id = parse_id(&id)?;
        let removed = self
            .in_pool(move |drinks| drinks.execute(DeleteDrink { id: drink_id }))
            .await?;
        if !removed {
            return Err(ApiError::NotFound);
        }
        Ok(HttpResponse::Ok().json(DeletedBody {
            success: true,
            delete: id,
        }))
    }

    async fn in_pool<R, F>(&self, f: F) -> Result<R, ApiError>
    where
        R: Send + 'static,
        F: FnOnce(&Drinks<M>) -> anyhow::Result<R> + Send + 'static,
    {
        let drinks = self.drinks.clone();
        let res = web::block(move || f(&drinks)).await??;
        Ok(res)
    }
}

impl<M: r2d2::ManageConnection> Clone for DrinkResources<M> {
    fn clone(&self) -> Self {
        let drinks = self.drinks.clone();
        let gate = self.gate.clone();
        DrinkResources { drinks, gate }
    }
}

fn parse_id(id: &str) -> Result<Id<Drink>, ApiError> {
    id.parse().map_err(|e| {
        debug!("Bad drink id {:?}: {}", id, e);
        ApiError::NotFound
    })
}

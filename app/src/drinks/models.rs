use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Number;

use infra::ids::{Entity, Id};
use infra::persistence::InvalidDocument;

/// A drink as persisted; `recipe` holds the JSON text of the ingredient list.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Drink {
    pub(crate) title: String,
    pub(crate) recipe: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Ingredient {
    pub name: String,
    pub color: String,
    pub parts: Number,
}

/// An ingredient without its name.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ShortIngredient {
    pub color: String,
    pub parts: Number,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ShortDrink {
    pub id: Id<Drink>,
    pub title: String,
    pub recipe: Vec<ShortIngredient>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct LongDrink {
    pub id: Id<Drink>,
    pub title: String,
    pub recipe: Vec<Ingredient>,
}

/// Body of a create request. Both fields are checked by `into_drink`.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct NewDrink {
    pub title: Option<String>,
    pub recipe: Option<Vec<Ingredient>>,
}

/// Body of an update request; absent fields are left alone.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct DrinkPatch {
    pub title: Option<String>,
    pub recipe: Option<Vec<Ingredient>>,
}

impl Drink {
    pub fn new(title: &str, recipe: &[Ingredient]) -> Result<Self> {
        let title = title.to_string();
        let recipe = serde_json::to_string(recipe).context("encode recipe")?;
        Ok(Drink { title, recipe })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn recipe(&self) -> Result<Vec<Ingredient>> {
        let recipe = serde_json::from_str(&self.recipe)
            .with_context(|| format!("decode recipe of {:?}", self.title))?;
        Ok(recipe)
    }

    pub fn short(&self, id: Id<Drink>) -> Result<ShortDrink> {
        let recipe = self
            .recipe()?
            .into_iter()
            .map(|Ingredient { color, parts, .. }| ShortIngredient { color, parts })
            .collect();
        Ok(ShortDrink {
            id,
            title: self.title.clone(),
            recipe,
        })
    }

    pub fn long(&self, id: Id<Drink>) -> Result<LongDrink> {
        Ok(LongDrink {
            id,
            title: self.title.clone(),
            recipe: self.recipe()?,
        })
    }

    pub fn apply(&mut self, patch: DrinkPatch) -> Result<()> {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(recipe) = patch.recipe {
            self.recipe = serde_json::to_string(&recipe).context("encode recipe")?;
        }
        Ok(())
    }
}

impl NewDrink {
    /// `None` when the title or recipe is missing or empty.
    pub fn into_drink(self) -> Result<Option<Drink>> {
        match (self.title, self.recipe) {
            (Some(title), Some(recipe)) if !title.is_empty() && !recipe.is_empty() => {
                Drink::new(&title, &recipe).map(Some)
            }
            _ => Ok(None),
        }
    }
}

impl Entity for Drink {
    const PREFIX: &'static str = "drink";

    fn validate(&self) -> Result<(), InvalidDocument> {
        if self.title.is_empty() {
            return Err(InvalidDocument("drink title is empty".into()));
        }
        match serde_json::from_str::<Vec<Ingredient>>(&self.recipe) {
            Ok(recipe) if !recipe.is_empty() => Ok(()),
            Ok(_) => Err(InvalidDocument("drink recipe is empty".into())),
            Err(e) => Err(InvalidDocument(format!("drink recipe is unreadable: {}", e))),
        }
    }
}

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use structopt::StructOpt;

use coffeeshop::drinks::{CreateDrink, Drinks, Ingredient, ListDrinks, NewDrink};
use coffeeshop::services::{Commandable, Queryable};

#[derive(Debug, StructOpt)]
#[structopt(name = "rb", about = "Coffee shop CLI")]
struct Opt {
    /// Input file
    #[structopt(parse(from_os_str))]
    config: PathBuf,
    #[structopt(subcommand)]
    command: Commands,
}

#[derive(Debug, StructOpt)]
enum Commands {
    #[structopt(name = "setup", about = "Initialize")]
    Setup,
    #[structopt(name = "show-menu", about = "Show menu")]
    ShowMenu,
    #[structopt(name = "add-drink", about = "Add a drink")]
    AddDrink {
        title: String,
        /// Ingredients as JSON, eg. '[{"name":"water","color":"blue","parts":1}]'
        recipe: String,
    },
}

#[derive(Deserialize, Debug)]
struct Config {
    #[serde(default)]
    postgres: coffeeshop::config::PostgresConfig,
    #[serde(default)]
    env_logger: coffeeshop::config::EnvLogger,
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    let mut config_buf = String::new();
    File::open(&opt.config)
        .with_context(|| format!("open {:?}", opt.config))?
        .read_to_string(&mut config_buf)?;
    let config: Config = toml::from_str(&config_buf)?;

    config.env_logger.builder().init();

    let drinks = Drinks::new(config.postgres.build()?);

    match opt.command {
        Commands::Setup => {
            drinks.setup()?;
        }
        Commands::ShowMenu => {
            for (id, drink) in drinks.query(ListDrinks)? {
                let short = drink.short(id)?;
                let colors = short
                    .recipe
                    .iter()
                    .map(|i| format!("{}x{}", i.parts, i.color))
                    .collect::<Vec<_>>();
                println!("{}: {} [{}]", id, short.title, colors.join(", "));
            }
        }
        Commands::AddDrink { title, recipe } => {
            let recipe: Vec<Ingredient> =
                serde_json::from_str(&recipe).context("recipe must be a JSON list")?;
            let new = NewDrink {
                title: Some(title),
                recipe: Some(recipe),
            };
            let drink = match new.into_drink()? {
                Some(drink) => drink,
                None => bail!("title and recipe must not be empty"),
            };
            let id = drinks.execute(CreateDrink { drink })?;
            println!("{}", id);
        }
    }

    Ok(())
}

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use actix_web::{middleware, App, HttpServer};
use anyhow::{Context, Result};
use log::*;
use serde::Deserialize;
use structopt::StructOpt;

use coffeeshop::auth::JwtVerifier;
use coffeeshop::CoffeeShop;
use infra::memory::MemoryConnectionManager;
use infra::persistence::Storage;

#[derive(Debug, StructOpt)]
#[structopt(name = "serve", about = "Serve the coffee shop drinks API.")]
struct Opt {
    /// Input file
    #[structopt(parse(from_os_str))]
    config: PathBuf,
    /// Keep drinks in memory instead of Postgres
    #[structopt(long = "in-memory")]
    in_memory: bool,
}

#[derive(Deserialize, Debug)]
struct Config {
    #[serde(flatten)]
    coffeeshop: coffeeshop::config::Config,
    listener: Listener,
    #[serde(default)]
    env_logger: coffeeshop::config::EnvLogger,
}

#[derive(Deserialize, Debug)]
struct Listener {
    addr: std::net::SocketAddr,
}

async fn run<M, D>(shop: CoffeeShop<M>, listener: &Listener) -> Result<()>
where
    M: r2d2::ManageConnection<Connection = D>,
    D: Storage + Send + 'static,
{
    let srv = HttpServer::new(move || {
        let shop = shop.clone();
        App::new()
            .wrap(middleware::Logger::default())
            .configure(move |cfg| shop.configure(cfg))
    })
    .bind(&listener.addr)
    .context("bind")?;
    info!("Listening on: {:?}", srv.addrs());
    srv.run().await?;
    Ok(())
}

#[actix_web::main]
async fn main() -> Result<()> {
    let opt = Opt::from_args();

    let mut config_buf = String::new();
    File::open(&opt.config)
        .with_context(|| format!("open {:?}", opt.config))?
        .read_to_string(&mut config_buf)?;
    let config: Config = toml::from_str(&config_buf)?;

    config.env_logger.builder().init();
    debug!("Options: {:?}", opt);

    if opt.in_memory {
        warn!("Drinks are kept in memory and will not survive a restart");
        let db = r2d2::Pool::builder().build(MemoryConnectionManager::new())?;
        let verifier = JwtVerifier::from_config(&config.coffeeshop.auth)?;
        let shop = CoffeeShop::new(db, Arc::new(verifier))?;
        run(shop, &config.listener).await
    } else {
        let shop = CoffeeShop::from_config(&config.coffeeshop)?;
        run(shop, &config.listener).await
    }
}

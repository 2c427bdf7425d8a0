use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::*;
use r2d2::Pool;
use serde::Deserialize;
use url::Url;

use infra::persistence::DocumentConnectionManager;

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default)]
    pub postgres: PostgresConfig,
    pub auth: AuthConfig,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct PostgresConfig {
    /// Falls back to `$POSTGRES_URL` when absent.
    pub url: Option<String>,
    pub pool_size: Option<u32>,
}

#[derive(Deserialize, Debug)]
struct PostgresEnv {
    postgres_url: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AuthConfig {
    /// Tokens must be issued by `https://<domain>/`.
    pub domain: String,
    pub audience: String,
    pub keys: KeySource,
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    /// Path to a JSON Web Key Set.
    Jwks(PathBuf),
    Secret(String),
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "lowercase")]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl PostgresConfig {
    fn url(&self) -> Result<String> {
        if let Some(url) = self.url.as_ref() {
            return Ok(url.clone());
        }
        let env: PostgresEnv = envy::from_env().context("$POSTGRES_URL")?;
        Ok(env.postgres_url)
    }

    pub fn build(&self) -> Result<Pool<DocumentConnectionManager>> {
        let manager = DocumentConnectionManager::from_url(&self.url()?)?;

        let mut builder = r2d2::Pool::builder();
        if let Some(size) = self.pool_size {
            builder = builder.max_size(size);
        }

        debug!("Pool builder: {:?}", builder);
        let pool = builder.build(manager).context("build pool")?;

        Ok(pool)
    }
}

impl AuthConfig {
    pub fn issuer(&self) -> Result<Url> {
        let issuer = Url::parse(&format!("https://{}/", self.domain))
            .with_context(|| format!("auth domain {:?}", self.domain))?;
        Ok(issuer)
    }
}

impl fmt::Debug for KeySource {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KeySource::Jwks(path) => fmt.debug_tuple("Jwks").field(path).finish(),
            KeySource::Secret(_) => fmt.debug_tuple("Secret").field(&"..").finish(),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct EnvLogger {
    level: Option<LogLevel>,
    modules: HashMap<String, LogLevel>,
    timestamp_nanos: bool,
}

impl LogLevel {
    fn to_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl EnvLogger {
    pub fn builder(&self) -> env_logger::Builder {
        let mut b = env_logger::Builder::from_default_env();
        if let Some(level) = self.level.as_ref() {
            b.filter_level(level.to_filter());
        }

        for (module, level) in self.modules.iter() {
            b.filter_module(module, level.to_filter());
        }

        if self.timestamp_nanos {
            b.format_timestamp_nanos();
        }

        b
    }
}

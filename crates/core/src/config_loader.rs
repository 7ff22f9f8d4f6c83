use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config/Loopbot.toml";
const DEFAULT_JSON_PATH: &str = "config/Loopbot.json";
const ENV_PREFIX: &str = "LOOPBOT_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `config/Loopbot.toml`, then `LOOPBOT_` environment variables,
    /// then joins `config/Loopbot.json` for keys still unset.
    ///
    /// Sections are split on `__`, e.g. `LOOPBOT_ARBITRAGE__MAX_HOPS=4`.
    /// Missing files fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a present source cannot be parsed.
    pub fn load() -> Result<AppConfig> {
        layered(Path::new(DEFAULT_CONFIG_PATH))
            .join(Json::file(DEFAULT_JSON_PATH))
            .extract()
            .with_context(|| format!("Failed to load {DEFAULT_CONFIG_PATH}"))
    }

    /// Loads an explicit TOML file with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        layered(path)
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))
    }
}

fn layered(toml: &Path) -> Figment {
    Figment::from(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(toml))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

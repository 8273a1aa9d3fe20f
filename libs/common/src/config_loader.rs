//! Configuration loading helpers
//!
//! One file (format picked by extension) layered under prefixed environment
//! variables. Nested keys use a double underscore:
//! `PLCSRV_PLC__HOST=10.0.0.5` overrides `plc.host`.

use std::path::Path;

use errors::{config_error, ServiceResult};
use figment::providers::{Env, Format, Json, Toml, Yaml};
use figment::Figment;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Build the figment for `path` plus `env_prefix` overrides
pub fn figment_for(path: &Path, env_prefix: &str) -> ServiceResult<Figment> {
    if !path.exists() {
        return Err(config_error!("Config file not found: {}", path.display()));
    }

    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| config_error!("Invalid file extension"))?;

    let figment = match extension.as_str() {
        "json" => Figment::new().merge(Json::file(path)),
        "toml" => Figment::new().merge(Toml::file(path)),
        "yaml" | "yml" => Figment::new().merge(Yaml::file(path)),
        other => {
            return Err(config_error!("Unsupported config format: {}", other))
        },
    };

    Ok(figment.merge(Env::prefixed(env_prefix).split("__")))
}

/// Load and deserialize a configuration file with environment overrides
pub fn load_config<T: DeserializeOwned>(path: &Path, env_prefix: &str) -> ServiceResult<T> {
    debug!("Loading config from {} (env prefix {})", path.display(), env_prefix);
    let config = figment_for(path, env_prefix)?.extract()?;
    Ok(config)
}

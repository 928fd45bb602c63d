use crate::config::AppConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_PATH: &str = "config/Config.toml";
const ENV_PREFIX: &str = "GEX_DESK_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration from compiled defaults, `config/Config.toml` and
    /// `GEX_DESK_*` environment variables, in that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file or variable cannot be parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Same as [`load`](Self::load) with an explicit TOML path.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file or variable cannot be parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig> {
        let config: AppConfig = Self::base(path.as_ref())
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Same as [`load_from`](Self::load_from) with a profile overlay read
    /// from `<stem>.<profile>.toml` next to `path`, e.g. `config/Config.paper.toml`.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration files cannot be read or parsed.
    pub fn load_with_profile(path: impl AsRef<Path>, profile: &str) -> Result<AppConfig> {
        let path = path.as_ref();
        let config: AppConfig = Self::base(path)
            .merge(Toml::file(profile_path(path, profile)))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    fn base(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default())).merge(Toml::file(path))
    }
}

fn profile_path(path: &Path, profile: &str) -> PathBuf {
    let stem = path.file_stem().map_or_else(|| "Config".into(), |s| s.to_string_lossy());
    path.with_file_name(format!("{stem}.{profile}.toml"))
}

// SPDX-License-Identifier: MIT

use std::fs::read_to_string;
use std::path::{Path, PathBuf};

use isolate_archiver::ArchiverConfig;
use isolate_store::Namespace;
use serde::Deserialize;

use crate::error::ConfigError;

const CONFIG_ENV: &str = "ISOLATE_CONFIG";
const SERVER_ENV: &str = "ISOLATE_SERVER";
const DEFAULT_CONFIG_FILE: &str = "isolate.toml";

/// Server value selecting the in-process fake store.
const FAKE_SERVER: &str = "fake";

fn default_namespace() -> String {
    Namespace::default().to_string()
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    #[serde(default)]
    pub(crate) server: Option<String>,
    #[serde(default = "default_namespace")]
    pub(crate) namespace: String,
    #[serde(default)]
    pub(crate) quiet: bool,
    #[serde(default)]
    pub(crate) archiver: ArchiverConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: None,
            namespace: default_namespace(),
            quiet: false,
            archiver: ArchiverConfig::default(),
        }
    }
}

/// Where archived content goes.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StoreTarget {
    /// In-memory store that lives as long as the process.
    Fake,
    /// Directory-backed store rooted at the path.
    Local(PathBuf),
}

impl Config {
    pub(crate) fn parse(contents: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.archiver.validate()?;
        Ok(config)
    }

    pub(crate) fn load_file(path: &Path) -> Result<Config, ConfigError> {
        let contents = read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;
        Config::parse(&contents)
    }

    pub(crate) fn store_target(&self) -> Result<StoreTarget, ConfigError> {
        match self.server.as_deref() {
            None | Some("") => Err(ConfigError::MissingServer),
            Some(FAKE_SERVER) => Ok(StoreTarget::Fake),
            Some(root) => Ok(StoreTarget::Local(PathBuf::from(root))),
        }
    }

    pub(crate) fn namespace(&self) -> Result<Namespace, ConfigError> {
        Namespace::new(self.namespace.as_str()).map_err(|_| ConfigError::MissingNamespace)
    }
}

/// Reads `$ISOLATE_CONFIG`, else `isolate.toml` in the working directory,
/// else defaults. `$ISOLATE_SERVER` fills in a server the file left unset.
pub(crate) fn load() -> Result<Config, ConfigError> {
    let mut config = match std::env::var(CONFIG_ENV) {
        Ok(path) => Config::load_file(Path::new(&path))?,
        Err(_) => {
            if Path::new(DEFAULT_CONFIG_FILE).exists() {
                Config::load_file(Path::new(DEFAULT_CONFIG_FILE))?
            } else {
                Config::default()
            }
        }
    };
    if config.server.is_none() {
        config.server = std::env::var(SERVER_ENV).ok();
    }
    Ok(config)
}

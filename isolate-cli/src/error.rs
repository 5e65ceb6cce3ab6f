// SPDX-License-Identifier: MIT

use isolate_archiver::{ArchiveError, InvalidConfig};
use isolate_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Archive(#[from] ArchiveError),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    #[error("{count} of {total} files failed")]
    Failed { count: usize, total: usize },

    #[error("failed to set up logging: {reason}")]
    Logging { reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("server must be specified")]
    MissingServer,

    #[error("namespace must be specified")]
    MissingNamespace,

    #[error(transparent)]
    Archiver(#[from] InvalidConfig),
}

pub type Result<T> = std::result::Result<T, CliError>;

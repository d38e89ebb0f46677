// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

//! YAML configuration with a process-wide handle.
//!
//! Initialization is explicit: the application calls [`load_from_path`] (or
//! [`load_from_str`] in tests) once, and the rest of the library consults
//! [`global`]. Keys are looked up by `/`-separated paths into nested
//! mappings, e.g. `backends/lustre/extends`.

mod alias;
pub use alias::apply_aliases;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock, RwLock};

use fsentry::ValueKind;

/// The environment variable naming an alternate configuration file.
pub const CONFIG_PATH_ENV: &str = "RBH_CONFIG_PATH";

/// The environment variable overriding the retention xattr name.
pub const RETENTION_XATTR_ENV: &str = "RBH_RETENTION_XATTR";

const DEFAULT_CONFIG_PATH: &str = "/etc/robinhood4.d/default.yaml";
const DEFAULT_RETENTION_XATTR: &str = "user.expires";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Invalid(String),

    #[error("alias '{0}' is not defined in the configuration")]
    UnknownAlias(String),

    #[error("infinite loop detected for alias '{0}'")]
    AliasLoop(String),
}

/// A loaded configuration document.
#[derive(Debug)]
pub struct Config {
    root: serde_yaml::Value,
}

impl Config {
    pub fn from_str(contents: &str) -> Result<Config, Error> {
        if contents.trim().is_empty() {
            return Ok(Config {
                root: serde_yaml::Value::Null,
            });
        }
        Ok(Config {
            root: serde_yaml::from_str(contents)?,
        })
    }

    pub fn open(path: &Path) -> Result<Config, Error> {
        let contents = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Config::from_str(&contents)
    }

    /// Look up a `/`-separated key path in the nested mappings.
    pub fn find(&self, key: &str) -> Option<&serde_yaml::Value> {
        let mut node = &self.root;
        for part in key.split('/') {
            node = node.as_mapping()?.get(part)?;
        }
        Some(node)
    }

    /// A string-typed key, or `default` when absent. A present key of
    /// another type is reported as absent, with a warning.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        match self.find(key) {
            None => default.to_owned(),
            Some(serde_yaml::Value::String(value)) => value.clone(),
            Some(other) => {
                tracing::warn!(key, ?other, "configuration key is not a string");
                default.to_owned()
            }
        }
    }

    /// The plugin implementing backend `name`, following the
    /// `backends/<name>/extends` redirection when present.
    pub fn backend_extends(&self, name: &str) -> Option<String> {
        match self.find(&format!("backends/{name}/extends"))? {
            serde_yaml::Value::String(plugin) => Some(plugin.clone()),
            other => {
                tracing::warn!(name, ?other, "'extends' is not a string");
                None
            }
        }
    }

    /// The `xattrs_map` section: xattr name to the value kind its payload
    /// should be decoded as. Unknown kind names are skipped with a warning.
    pub fn xattrs_map(&self) -> HashMap<String, ValueKind> {
        let mut map = HashMap::new();
        let Some(serde_yaml::Value::Mapping(section)) = self.find("xattrs_map") else {
            return map;
        };
        for (key, value) in section {
            let (Some(xattr), Some(kind_name)) = (key.as_str(), value.as_str()) else {
                tracing::warn!(?key, ?value, "ignoring non-string xattrs_map entry");
                continue;
            };
            match ValueKind::from_name(kind_name) {
                Some(kind) => {
                    map.insert(xattr.to_owned(), kind);
                }
                None => {
                    tracing::warn!(xattr, kind_name, "unknown value type in xattrs_map");
                }
            }
        }
        map
    }
}

/// The xattr holding retention dates: the environment wins over the
/// configuration, which wins over the built-in default.
pub fn retention_xattr(config: Option<&Config>) -> String {
    if let Ok(xattr) = std::env::var(RETENTION_XATTR_ENV) {
        return xattr;
    }
    match config {
        Some(config) => config.get_string("retention_xattr", DEFAULT_RETENTION_XATTR),
        None => DEFAULT_RETENTION_XATTR.to_owned(),
    }
}

fn handle() -> &'static RwLock<Option<Arc<Config>>> {
    static HANDLE: OnceLock<RwLock<Option<Arc<Config>>>> = OnceLock::new();
    HANDLE.get_or_init(|| RwLock::new(None))
}

/// Load the process-wide configuration from `path`, or from
/// `$RBH_CONFIG_PATH`, or from the default location. A missing default file
/// yields an empty configuration.
pub fn load_from_path(path: Option<&Path>) -> Result<(), Error> {
    let config = match path {
        Some(path) => Config::open(path)?,
        None => match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Config::open(Path::new(&path))?,
            Err(_) => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Config::open(default)?
                } else {
                    Config::from_str("")?
                }
            }
        },
    };
    *handle().write().unwrap() = Some(Arc::new(config));
    Ok(())
}

/// Install an already-parsed configuration (used by tests).
pub fn load_from_str(contents: &str) -> Result<(), Error> {
    let config = Config::from_str(contents)?;
    *handle().write().unwrap() = Some(Arc::new(config));
    Ok(())
}

/// The process-wide configuration, if one was loaded.
pub fn global() -> Option<Arc<Config>> {
    handle().read().unwrap().clone()
}

// This file is part of the RobinHood Library
// Copyright (C) 2026 Commissariat a l'energie atomique et aux energies
//                    alternatives
//
// SPDX-License-Identifier: LGPL-3.0-or-later

//! The plugin registry.
//!
//! Backends are provided by named plugins; extensions attach to a plugin by
//! name and contribute extra behavior (typically filter construction for
//! plugin-specific predicates). The registry is process-global, lazily
//! initialized and append-only for the life of the process.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, OnceLock, RwLock};

use filter::OwnedFilter;

use crate::{Backend, Error, Uri, UriSelector};

/// A factory of [`Backend`] instances, registered under a unique name.
pub trait BackendPlugin: Send + Sync {
    fn name(&self) -> &'static str;

    /// `(major, minor, release)`.
    fn version(&self) -> (u8, u8, u16);

    /// The capabilities instances of this plugin advertise.
    fn capabilities(&self) -> u32;

    /// Open a backend on the filesystem instance named `fsname`.
    fn new_backend(&self, fsname: &str) -> Result<Box<dyn Backend>, Error>;
}

/// An extension contributed to a plugin by another component.
pub trait PluginExtension: Send + Sync {
    /// The plugin this extension attaches to.
    fn plugin(&self) -> &'static str;

    fn name(&self) -> &'static str;

    fn version(&self) -> (u8, u8, u16);

    /// Build a filter for an extension-specific predicate.
    fn build_filter(&self, _args: &[String]) -> Result<OwnedFilter, Error> {
        Err(Error::Unsupported("build_filter"))
    }
}

struct Registry {
    plugins: HashMap<String, Arc<dyn BackendPlugin>>,
    /// Keyed by `(plugin name, extension name)`.
    extensions: HashMap<(String, String), Arc<dyn PluginExtension>>,
}

fn registry() -> &'static RwLock<Registry> {
    static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        RwLock::new(Registry {
            plugins: HashMap::new(),
            extensions: HashMap::new(),
        })
    })
}

/// Register a plugin. Registering a name twice is a no-op when the plugin
/// is already known (the registry is append-only).
pub fn register_plugin(plugin: Arc<dyn BackendPlugin>) {
    let mut registry = registry().write().unwrap();
    let name = plugin.name().to_owned();
    if registry.plugins.contains_key(&name) {
        tracing::debug!(name, "plugin already registered");
        return;
    }
    tracing::debug!(name, version = ?plugin.version(), "registered backend plugin");
    registry.plugins.insert(name, plugin);
}

/// Register an extension under its plugin's name.
pub fn register_extension(extension: Arc<dyn PluginExtension>) {
    let mut registry = registry().write().unwrap();
    let key = (extension.plugin().to_owned(), extension.name().to_owned());
    if registry.extensions.contains_key(&key) {
        return;
    }
    registry.extensions.insert(key, extension);
}

/// Resolve a plugin by name.
pub fn import_plugin(name: &str) -> Result<Arc<dyn BackendPlugin>, Error> {
    registry()
        .read()
        .unwrap()
        .plugins
        .get(name)
        .cloned()
        .ok_or_else(|| Error::invalid(format!("no such backend plugin: '{name}'")))
}

/// Resolve an extension of `plugin` by name.
pub fn load_extension(
    plugin: &dyn BackendPlugin,
    name: &str,
) -> Result<Arc<dyn PluginExtension>, Error> {
    registry()
        .read()
        .unwrap()
        .extensions
        .get(&(plugin.name().to_owned(), name.to_owned()))
        .cloned()
        .ok_or_else(|| {
            Error::invalid(format!(
                "plugin '{}' has no extension '{name}'",
                plugin.name(),
            ))
        })
}

/// Instantiate a ready-to-use backend from a URI.
///
/// The backend name may be redirected by the `backends/<name>/extends`
/// configuration key to the plugin that actually implements it. When the
/// URI carries a path or ID fragment, the returned backend is branched
/// into the designated subtree.
pub fn from_uri(uri: &str) -> Result<Box<dyn Backend>, Error> {
    let uri = Uri::from_str(uri)?;

    let plugin_name = rbh_config::global()
        .and_then(|config| config.backend_extends(&uri.backend))
        .unwrap_or_else(|| uri.backend.clone());
    let plugin = import_plugin(&plugin_name)?;

    tracing::debug!(
        backend = uri.backend,
        plugin = plugin_name,
        fsname = uri.fsname,
        "instantiating backend",
    );
    let backend = plugin.new_backend(&uri.fsname)?;

    match &uri.selector {
        UriSelector::Bare => Ok(backend),
        UriSelector::Path(path) => backend.branch(None, Some(path)),
        UriSelector::Id(id) => backend.branch(Some(id), None),
    }
}

//! Process-wide access to the current loader.
//!
//! Holds at most one "current" [`Loader`] behind an atomically swappable
//! reference. [`load`] always installs a brand-new loader; the other entry
//! points lazily load on first use. Concurrent first-access may race two
//! loads; the stored loader is whichever load finished last, which is the
//! accepted contract. [`reset`] clears the singleton explicitly.

use crate::error::SettingsResult;
use crate::loader::Loader;
use arc_swap::ArcSwapOption;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

static CURRENT: ArcSwapOption<Mutex<Loader>> = ArcSwapOption::const_empty();

/// Sources to load, applied in order: env, single file, single directory,
/// then each extra directory.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    pub config_dirs: Vec<PathBuf>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.config_file = Some(file.into());
        self
    }

    pub fn config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(dir.into());
        self
    }

    pub fn config_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.config_dirs = dirs.into_iter().collect();
        self
    }
}

/// Build a fresh loader from the given options and install it as the
/// current one, replacing whatever was there.
///
/// The new loader is installed before the sources run, so a directory
/// permission failure still leaves it as the current loader; the error is
/// returned to the caller.
pub fn load(options: &LoadOptions) -> SettingsResult<Arc<Mutex<Loader>>> {
    let handle = Arc::new(Mutex::new(Loader::new()));
    CURRENT.store(Some(Arc::clone(&handle)));

    {
        let mut loader = lock(&handle);
        loader.load_env();
        if let Some(file) = &options.config_file {
            loader.load_file(file);
        }
        if let Some(dir) = &options.config_dir {
            loader.load_directory(dir)?;
        }
        for dir in &options.config_dirs {
            loader.load_directory(dir)?;
        }
    }
    Ok(handle)
}

/// The current loader, loading with the given options first if none is set.
pub fn get(options: &LoadOptions) -> SettingsResult<Arc<Mutex<Loader>>> {
    match CURRENT.load_full() {
        Some(handle) => Ok(handle),
        None => load(options),
    }
}

/// Look up a top-level settings category on the current loader, loading
/// with default options first if needed.
///
/// Total by construction: a failed implicit load is logged fatal and
/// swallowed, and missing keys come back as `None`.
pub fn get_value(key: &str) -> Option<Value> {
    let handle = match CURRENT.load_full() {
        Some(handle) => handle,
        None => {
            tracing::info!("settings were not loaded, auto loading now");
            match load(&LoadOptions::default()) {
                Ok(handle) => handle,
                Err(err) => {
                    tracing::error!(fatal = true, "auto load failed during lookup: {}", err);
                    return None;
                }
            }
        }
    };
    let loader = lock(&handle);
    loader.get(key).cloned()
}

/// Overwrite a top-level key on the current loader, loading first if needed.
/// A raw overwrite, not a merge.
pub fn set_prop(key: &str, value: Value) -> SettingsResult<()> {
    let handle = get(&LoadOptions::default())?;
    lock(&handle).set(key, value);
    Ok(())
}

/// Deep-merge a subtree under the given key on the current loader, loading
/// first if needed. The subtree wins on conflict.
pub fn merge_settings(key: &str, subtree: Map<String, Value>) -> SettingsResult<()> {
    let handle = get(&LoadOptions::default())?;
    let mut wrapped = Map::new();
    wrapped.insert(key.to_string(), Value::Object(subtree));
    lock(&handle).load_module_settings(wrapped);
    Ok(())
}

/// Install a loader as the current one.
pub fn set_loader(loader: Loader) -> Arc<Mutex<Loader>> {
    let handle = Arc::new(Mutex::new(loader));
    CURRENT.store(Some(Arc::clone(&handle)));
    handle
}

/// Clear the current loader; the next access loads fresh.
pub fn reset() {
    CURRENT.store(None);
}

fn lock(handle: &Mutex<Loader>) -> std::sync::MutexGuard<'_, Loader> {
    // Merges swap the tree in whole, so a poisoned lock still holds a
    // consistent tree.
    handle.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

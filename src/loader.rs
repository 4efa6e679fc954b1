//! Settings loader: merges environment, file, and directory sources into one
//! tree, tracks provenance, and fingerprints the result.
//!
//! A loader owns its tree exclusively; every merge builds a fresh tree and
//! swaps it in whole, so no caller ever observes a half-merged state.

use crate::error::{SettingsError, SettingsResult};
use crate::logging::Logger;
use crate::merge::{deep_diff, deep_merge};
use crate::os;
use crate::validator::ValidatorEngine;
use serde::Serialize;
use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Environment variable overriding the API port.
pub const ENV_API_PORT: &str = "LEGION_API_PORT";
/// Environment variable selecting the manifest directory (defaults to the
/// system temp dir).
pub const ENV_MANIFEST_DIR: &str = "LEGION_LOADED_TEMPFILE_DIR";
/// Environment variable set to the manifest path after a dump.
pub const ENV_MANIFEST: &str = "LEGION_LOADED_TEMPFILE";

/// Roles whose fingerprint covers the full tree and which receive client
/// subscription overrides.
const CLIENT_ROLES: &[&str] = &["client", "test"];

/// An accumulated warning or error record.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Diagnostic {
    pub message: String,
    pub data: Value,
}

/// Layered settings loader.
///
/// Sources are applied by explicit calls, each deep-merging into the running
/// tree: [`load_env`](Self::load_env), then optionally
/// [`load_file`](Self::load_file) and [`load_directory`](Self::load_directory)
/// any number of times. Loading is forgiving: missing files and malformed
/// documents are logged and skipped. The only fatal path is a config
/// directory that cannot be read.
pub struct Loader {
    settings: Map<String, Value>,
    warnings: Vec<Diagnostic>,
    errors: Vec<Diagnostic>,
    loaded_files: Vec<PathBuf>,
    digest: Option<String>,
    role: String,
    logger: Logger,
}

impl Loader {
    /// Create a loader with the role derived from the executable name.
    pub fn new() -> Self {
        Self::with_role(os::service_role())
    }

    /// Create a loader with an explicit process role.
    pub fn with_role(role: impl Into<String>) -> Self {
        Self {
            settings: default_settings(),
            warnings: Vec::new(),
            errors: Vec::new(),
            loaded_files: Vec::new(),
            digest: None,
            role: role.into(),
            logger: Logger::new().with_name("settings"),
        }
    }

    /// The merged settings tree.
    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }

    /// Look up a top-level category. Total: absent keys are `None`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    /// Overwrite a top-level key directly, bypassing the merge.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.settings.insert(key.into(), value);
        self.digest = None;
    }

    /// Process role this loader was built for.
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Accumulated warnings, in the order they were recorded.
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    /// Accumulated errors, in the order they were recorded. Never cleared.
    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    /// Paths of successfully loaded files, in load order.
    pub fn loaded_files(&self) -> &[PathBuf] {
        &self.loaded_files
    }

    /// Apply environment variable overrides.
    pub fn load_env(&mut self) {
        self.load_api_env();
    }

    fn load_api_env(&mut self) {
        let Ok(raw) = std::env::var(ENV_API_PORT) else {
            return;
        };
        match raw.parse::<i64>() {
            Ok(port) => {
                let api = self
                    .settings
                    .entry("api".to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                match api {
                    Value::Object(map) => {
                        map.insert("port".to_string(), json!(port));
                    }
                    other => *other = json!({ "port": port }),
                }
                self.digest = None;
                let api = self.settings.get("api").cloned().unwrap_or(Value::Null);
                self.warning("using api port environment variable", json!({ "api": api }));
            }
            Err(_) => {
                self.warning(
                    "ignoring non-integer LEGION_API_PORT value",
                    json!({ "value": raw }),
                );
            }
        }
    }

    /// Load a single JSON config file and merge it into the tree.
    ///
    /// Missing or unreadable paths are warned about and skipped. Malformed
    /// content is logged at error severity and skipped; the tree and the
    /// loaded-files record are left untouched. An empty file merges an empty
    /// mapping: no tree change, but the path is still recorded.
    pub fn load_file(&mut self, file: impl AsRef<Path>) {
        let file = file.as_ref();
        self.logger
            .debug(&format!("trying to load file {}", file.display()));

        let contents = match fs::read(file) {
            Ok(bytes) if file.is_file() => bytes,
            _ => {
                self.warning(
                    "config file does not exist or is not readable",
                    json!({ "file": file.display().to_string() }),
                );
                return;
            }
        };

        let text = String::from_utf8_lossy(&contents);
        let text = text.strip_prefix('\u{feff}').unwrap_or(text.as_ref()).trim();

        let parsed = if text.is_empty() {
            Map::new()
        } else {
            match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    self.logger.error("config file must be valid json");
                    self.logger.debug(&format!(
                        "file: {}, error: top-level value is not an object",
                        file.display()
                    ));
                    return;
                }
                Err(err) => {
                    self.logger.error("config file must be valid json");
                    self.logger
                        .debug(&format!("file: {}, error: {}", file.display(), err));
                    return;
                }
            }
        };

        let merged = deep_merge(&self.settings, &parsed);
        self.log_diff_since(&merged);
        self.settings = merged;
        self.digest = None;
        self.loaded_files.push(file.to_path_buf());
    }

    /// Load every `*.json` file under a directory, at any depth.
    ///
    /// Enumeration order is filesystem-dependent and not guaranteed to be
    /// stable across platforms. A directory that cannot be read or
    /// traversed is the one fatal loading path: the error is recorded and
    /// returned.
    pub fn load_directory(&mut self, directory: impl AsRef<Path>) -> SettingsResult<()> {
        let normalized = directory.as_ref().to_string_lossy().replace('\\', "/");
        let path = PathBuf::from(&normalized);

        if fs::read_dir(&path).is_err() || !directory_traversable(&path) {
            self.record_error(
                "insufficient permissions for loading",
                json!({ "directory": normalized }),
            );
            return Err(SettingsError::InsufficientPermissions { directory: path });
        }

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(&path).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() {
                continue;
            }
            let candidate = entry.path();
            if candidate.extension().and_then(|ext| ext.to_str()) == Some("json")
                && !files.iter().any(|f| f == candidate)
            {
                files.push(candidate.to_path_buf());
            }
        }

        for file in files {
            self.load_file(file);
        }
        Ok(())
    }

    /// Merge a subtree into the settings, with the subtree winning on
    /// conflict. Lets a module inject settings under its namespace without
    /// touching disk.
    pub fn load_module_settings(&mut self, config: Map<String, Value>) {
        self.settings = deep_merge(&self.settings, &config);
        self.digest = None;
    }

    /// Merge defaults under the settings: existing values win on conflict.
    /// Seeds a module's defaults without clobbering earlier overrides.
    pub fn load_module_default(&mut self, config: Map<String, Value>) {
        let merged = deep_merge(&config, &self.settings);
        self.log_diff_since(&merged);
        self.settings = merged;
        self.digest = None;
    }

    /// Append the canonical `client:<name>` tag to the client subscription
    /// list, creating the list if absent and deduplicating it.
    pub fn load_client_overrides(&mut self) {
        let name = self
            .settings
            .get("client")
            .and_then(|client| client.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        let Some(client) = self.settings.get_mut("client").and_then(Value::as_object_mut) else {
            self.warning(
                "unable to apply legion client overrides, reason: client is not a hash",
                Value::Null,
            );
            return;
        };
        let subscriptions = client
            .entry("subscriptions".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));

        match subscriptions {
            Value::Array(list) => {
                list.push(Value::String(format!("client:{name}")));
                let mut deduped: Vec<Value> = Vec::with_capacity(list.len());
                for value in list.drain(..) {
                    if !deduped.contains(&value) {
                        deduped.push(value);
                    }
                }
                *list = deduped;
                self.digest = None;
            }
            _ => {
                self.warning(
                    "unable to apply legion client overrides, reason: client subscriptions is not an array",
                    Value::Null,
                );
            }
        }
    }

    /// Apply client overrides when the process role calls for them.
    pub fn load_overrides(&mut self) {
        if CLIENT_ROLES.contains(&self.role.as_str()) {
            self.load_client_overrides();
        }
    }

    /// Run the built-in validation rules, appending findings to `errors`.
    /// Repeated calls accumulate; nothing is ever cleared.
    pub fn validate(&mut self) {
        self.validate_with(&ValidatorEngine::default());
    }

    /// Run a caller-supplied rule set, appending findings to `errors`.
    pub fn validate_with(&mut self, engine: &ValidatorEngine) {
        for finding in engine.run(&self.settings, &self.role) {
            self.errors.push(Diagnostic {
                message: finding.message,
                data: finding.context,
            });
        }
    }

    /// Content fingerprint of the settings tree: SHA-256 of its canonical
    /// JSON form, cached until the tree changes.
    ///
    /// Client-side roles hash the full tree; every other role hashes the
    /// tree with the `client` category removed, so fleet-wide config
    /// fingerprints identically across hosts.
    pub fn hexdigest(&mut self) -> String {
        if let Some(digest) = &self.digest {
            return digest.clone();
        }
        let mut tree = self.settings.clone();
        if !CLIENT_ROLES.contains(&self.role.as_str()) {
            tree.remove("client");
        }
        let canonical = Value::Object(tree).to_string();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        self.digest = Some(digest.clone());
        digest
    }

    /// Write the colon-separated loaded-files manifest and point
    /// `LEGION_LOADED_TEMPFILE` at it. The directory comes from
    /// `LEGION_LOADED_TEMPFILE_DIR`, defaulting to the system temp dir.
    pub fn write_loaded_manifest(&self) -> SettingsResult<PathBuf> {
        let dir = std::env::var_os(ENV_MANIFEST_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(std::env::temp_dir);
        let path = dir.join(format!("legion_{}_loaded_files", self.role));
        let joined = self
            .loaded_files
            .iter()
            .map(|file| file.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(":");
        fs::write(&path, joined).map_err(|source| SettingsError::ManifestWrite {
            path: path.clone(),
            source,
        })?;
        // Loading happens before any worker threads exist.
        unsafe { std::env::set_var(ENV_MANIFEST, &path) };
        Ok(path)
    }

    fn log_diff_since(&self, merged: &Map<String, Value>) {
        if self.loaded_files.is_empty() {
            return;
        }
        let diff = deep_diff(&self.settings, merged);
        if !diff.is_empty() {
            self.logger
                .debug(&format!("settings changed: {}", Value::Object(diff)));
        }
    }

    fn warning(&mut self, message: &str, data: Value) {
        self.warnings.push(Diagnostic {
            message: message.to_string(),
            data,
        });
        self.logger.warn(message);
    }

    fn record_error(&mut self, message: &str, data: Value) {
        self.errors.push(Diagnostic {
            message: message.to_string(),
            data,
        });
        self.logger.error(message);
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether the directory can be descended into, not just listed. On Unix
/// that requires an execute bit; listing alone only needs the read bit.
fn directory_traversable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path)
            .map(|meta| meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        true
    }
}

/// Fixed top-level categories every loader starts from.
fn default_settings() -> Map<String, Value> {
    let defaults = json!({
        "client": client_defaults(),
        "cluster": { "public_keys": {} },
        "crypt": {
            "cluster_secret": null,
            "cluster_secret_timeout": 5,
            "vault": { "connected": false }
        },
        "cache": { "enabled": true, "connected": false, "driver": "dalli" },
        "extensions": {},
        "reload": false,
        "reloading": false,
        "auto_install_missing_lex": true,
        "default_extension_settings": {
            "logger": { "level": "info", "trace": false, "extended": false }
        },
        "logging": {
            "level": "info",
            "location": "stdout",
            "trace": true,
            "backtrace_logging": true
        },
        "transport": { "connected": false },
        "data": { "connected": false }
    });
    match defaults {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Identity of this process: hostname, address, and a name unique per
/// host and pid.
fn client_defaults() -> Value {
    let hostname = os::system_hostname();
    json!({
        "hostname": hostname,
        "address": os::system_address(),
        "name": format!("{}.{}", hostname.replace('.', "_"), std::process::id()),
        "ready": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_categories_present() {
        let loader = Loader::with_role("test");
        for category in [
            "client",
            "cluster",
            "crypt",
            "cache",
            "extensions",
            "default_extension_settings",
            "logging",
            "transport",
            "data",
        ] {
            assert!(loader.get(category).is_some(), "missing {category}");
        }
        assert_eq!(loader.get("reload"), Some(&json!(false)));
        assert_eq!(loader.get("reloading"), Some(&json!(false)));
    }

    #[test]
    fn test_client_defaults_populated() {
        let loader = Loader::with_role("test");
        let client = loader.get("client").and_then(Value::as_object).unwrap();
        assert!(client.get("hostname").and_then(Value::as_str).is_some());
        assert!(client.get("address").and_then(Value::as_str).is_some());
        let name = client.get("name").and_then(Value::as_str).unwrap();
        assert!(name.ends_with(&format!(".{}", std::process::id())));
        assert_eq!(client.get("ready"), Some(&json!(false)));
    }

    #[test]
    fn test_module_settings_overlay_wins() {
        let mut loader = Loader::with_role("test");
        let injected = json!({ "cache": { "enabled": false, "ttl": 60 } })
            .as_object()
            .cloned()
            .unwrap();
        loader.load_module_settings(injected);
        let cache = loader.get("cache").unwrap();
        assert_eq!(cache["enabled"], json!(false));
        assert_eq!(cache["ttl"], json!(60));
        assert_eq!(cache["driver"], json!("dalli"));
    }

    #[test]
    fn test_module_default_existing_wins() {
        let mut loader = Loader::with_role("test");
        let defaults = json!({ "cache": { "enabled": false, "ttl": 60 } })
            .as_object()
            .cloned()
            .unwrap();
        loader.load_module_default(defaults);
        let cache = loader.get("cache").unwrap();
        assert_eq!(cache["enabled"], json!(true));
        assert_eq!(cache["ttl"], json!(60));
    }

    #[test]
    fn test_client_overrides_append_and_dedupe() {
        let mut loader = Loader::with_role("client");
        loader.load_overrides();
        loader.load_overrides();
        let subs = loader.get("client").unwrap()["subscriptions"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(subs.len(), 1);
        let tag = subs[0].as_str().unwrap();
        assert!(tag.starts_with("client:"));
    }

    #[test]
    fn test_client_overrides_skipped_for_other_roles() {
        let mut loader = Loader::with_role("scheduler");
        loader.load_overrides();
        assert!(loader.get("client").unwrap().get("subscriptions").is_none());
    }

    #[test]
    fn test_client_overrides_warn_on_non_list() {
        let mut loader = Loader::with_role("client");
        let clobbered = json!({ "client": { "subscriptions": "oops" } })
            .as_object()
            .cloned()
            .unwrap();
        loader.load_module_settings(clobbered);
        loader.load_client_overrides();
        assert_eq!(loader.get("client").unwrap()["subscriptions"], json!("oops"));
        assert!(
            loader
                .warnings()
                .iter()
                .any(|w| w.message.contains("subscriptions is not an array"))
        );
    }

    #[test]
    fn test_client_overrides_warn_when_client_not_a_mapping() {
        let mut loader = Loader::with_role("client");
        loader.set("client", json!("clobbered"));
        loader.load_client_overrides();
        assert_eq!(loader.get("client"), Some(&json!("clobbered")));
        assert!(
            loader
                .warnings()
                .iter()
                .any(|w| w.message.contains("client is not a hash"))
        );
    }

    #[test]
    fn test_validate_accumulates() {
        let mut loader = Loader::with_role("test");
        let bad = json!({ "legion": { "spawn": { "limit": 0 } } })
            .as_object()
            .cloned()
            .unwrap();
        loader.load_module_settings(bad);
        loader.validate();
        assert_eq!(loader.errors().len(), 1);
        loader.validate();
        assert_eq!(loader.errors().len(), 2);
    }

    #[test]
    fn test_hexdigest_stable_and_sensitive() {
        let mut loader = Loader::with_role("test");
        let first = loader.hexdigest();
        assert_eq!(loader.hexdigest(), first);

        loader.set("transport", json!({ "connected": true }));
        let second = loader.hexdigest();
        assert_ne!(first, second);
        assert_eq!(loader.hexdigest(), second);
    }

    #[test]
    fn test_hexdigest_excludes_client_for_service_roles() {
        let mut a = Loader::with_role("scheduler");
        let mut b = Loader::with_role("scheduler");
        // Client identity differs per pid and hostname; force a difference.
        a.set("client", json!({ "name": "a" }));
        b.set("client", json!({ "name": "b" }));
        assert_eq!(a.hexdigest(), b.hexdigest());

        let mut c = Loader::with_role("client");
        let mut d = Loader::with_role("client");
        c.set("client", json!({ "name": "c" }));
        d.set("client", json!({ "name": "d" }));
        assert_ne!(c.hexdigest(), d.hexdigest());
    }
}

//! Layered configuration for Legion services.
//!
//! Settings are merged from environment variables, a single config file, and
//! directories of JSON files, in that order, into one in-memory tree. Each
//! source deep-merges into the running tree; the merged result is
//! fingerprinted for drift detection and validated against a pluggable rule
//! set before the service starts.
//!
//! Most callers go through the [`facade`] module, which holds the current
//! [`Loader`] process-wide:
//!
//! ```no_run
//! use legion_settings::facade::{self, LoadOptions};
//!
//! let options = LoadOptions::new().config_dir("/etc/legion/conf.d");
//! let handle = facade::load(&options)?;
//! let mut loader = handle.lock().unwrap();
//! loader.validate();
//! assert!(loader.errors().is_empty());
//! # Ok::<(), legion_settings::SettingsError>(())
//! ```

pub mod error;
pub mod facade;
pub mod loader;
pub mod logging;
pub mod merge;
pub mod os;
pub mod validator;

pub use error::{SettingsError, SettingsResult};
pub use loader::{Diagnostic, Loader};
pub use merge::{deep_diff, deep_merge};
pub use validator::{Rule, ValidationError, ValidatorEngine};
